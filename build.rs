//! # Build Script
//!
//! Embeds the Windows Application Manifest (`app.manifest`, referenced from `app.rc`)
//! into the final executable.
//!
//! The manifest controls:
//! - The active code page (UTF-8), so Chinese console output renders without `chcp`.
//! - User Account Control (UAC) behavior (`asInvoker`, packaging never needs Admin).
//! - Windows Version Compatibility (identifying as Win10/11 compatible).

fn main() {
    println!("cargo:rerun-if-changed=app.rc");
    println!("cargo:rerun-if-changed=app.manifest");
    // Non-Windows targets compile nothing here; on Windows a missing resource compiler
    // leaves us without the manifest, and SetConsoleOutputCP still covers the console.
    let _ = embed_resource::compile("app.rc", embed_resource::NONE);
}
