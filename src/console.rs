//! Console setup.
//!
//! The launcher prints Chinese text; a console still on a legacy code page (936/437)
//! would show mojibake for the inherited output of the packaging script.

use log::debug;

/// UTF-8 code page identifier.
#[cfg(windows)]
const CP_UTF8: u32 = 65001;

/// Switches the console output code page to UTF-8 (`chcp 65001`).
#[cfg(windows)]
pub fn enable_utf8() {
    use windows::Win32::System::Console::SetConsoleOutputCP;

    // Fails harmlessly when there is no console (output redirected to a file).
    match unsafe { SetConsoleOutputCP(CP_UTF8) } {
        Ok(()) => debug!("Console output code page set to UTF-8"),
        Err(e) => debug!("Could not set console code page: {}", e),
    }
}

/// Terminals elsewhere are UTF-8 already.
#[cfg(not(windows))]
pub fn enable_utf8() {
    debug!("Console encoding left to the terminal");
}
