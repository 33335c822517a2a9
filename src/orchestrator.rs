//! # Build Orchestration
//!
//! The whole launcher in one linear sequence:
//! 1. Find a Python interpreter (`interpreter::locate`).
//! 2. Run the packaging script with it.
//! 3. Judge the artifact (`artifact::judge`).
//! 4. Tell the user, then wait for a key press.
//!
//! Domain failures (no Python, no ZIP) are `Outcome` values, not errors, so the report and
//! the pause happen on every branch. Only console write failures come back as `Err`.

use std::io::Write;
use anyhow::Result;
use log::{debug, error, info, warn};
use crate::artifact::{self, ArchiveSummary, Verdict};
use crate::config::BuildConfig;
use crate::interpreter::{self, MIN_SUPPORTED};
use crate::system::{ScriptExit, SystemOps};

pub const DOWNLOAD_URL: &str = "https://www.python.org/downloads/";
pub const SUCCESS_HEADLINE: &str = "✅ 打包完成!";
pub const FAILURE_HEADLINE: &str = "❌ 打包失败，请检查上方错误信息";
const RULE: &str = "============================================================";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No interpreter answered; the build step never ran.
    InterpreterMissing,
    /// The build step ran; here is what it left behind.
    Finished(Verdict),
}

impl Outcome {
    /// `1` for a missing interpreter. A failed build only counts in strict mode,
    /// matching the batch launcher, which always ended normally after printing.
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self {
            Outcome::InterpreterMissing => 1,
            Outcome::Finished(verdict) if strict && !verdict.is_delivered() => 2,
            Outcome::Finished(_) => 0,
        }
    }
}

/// Runs the full sequence and pauses (if configured) on every branch.
pub fn run(system: &impl SystemOps, config: &BuildConfig, out: &mut impl Write) -> Result<Outcome> {
    let outcome = run_sequence(system, config, out);
    if config.pause {
        let _ = out.flush();
        system.wait_for_key();
    }
    outcome
}

/// Reports a configuration that could not be resolved and returns the exit code (`1`).
///
/// The build never starts, but the console still stays open like on every other branch.
pub fn config_failed(system: &impl SystemOps, err: &anyhow::Error, pause: bool, out: &mut impl Write) -> i32 {
    error!("Configuration error: {:#}", err);
    let _ = writeln!(out, "❌ 配置错误: {:#}", err);
    if pause {
        let _ = out.flush();
        system.wait_for_key();
    }
    1
}

fn run_sequence(system: &impl SystemOps, config: &BuildConfig, out: &mut impl Write) -> Result<Outcome> {
    print_banner(out)?;

    // 1. Interpreter
    let Some(interpreter) = interpreter::locate(system, config) else {
        error!("No Python interpreter answered --version (looked for {:?})", config.interpreters);
        print_missing_interpreter(out)?;
        return Ok(Outcome::InterpreterMissing);
    };
    writeln!(out, "✓ 已找到 {}", interpreter.banner)?;
    if !interpreter.is_supported() {
        warn!(
            "{} is older than {}; the packaging script will likely refuse to run",
            interpreter.banner, MIN_SUPPORTED
        );
    }

    // 2. Packaging script
    if !system.path_exists(&config.script) {
        warn!("Packaging script {:?} not found; running it anyway so the interpreter reports why", config.script);
    }
    let before = system.artifact_stamp(&config.artifact);
    if before.is_some() {
        debug!("{:?} exists before the build; it must be rewritten to count", config.artifact);
    }

    writeln!(out)?;
    writeln!(out, "正在运行打包脚本 {} ...", config.script.display())?;
    out.flush()?;

    let exit = match system.run_packaging_script(&interpreter.path, &config.script, &config.project_dir) {
        Ok(exit) => exit,
        Err(e) => {
            error!("{:#}", e);
            ScriptExit::spawn_failed()
        }
    };
    info!("Packaging script finished with exit code {:?}", exit.code);

    // 3. Artifact
    let after = system.artifact_stamp(&config.artifact);
    let verdict = artifact::judge(before.as_ref(), after.as_ref(), &exit, || {
        system.inspect_archive(&config.artifact)
    });
    info!("Verdict: {:?}", verdict);

    // 4. Report
    match &verdict {
        Verdict::Delivered(summary) => print_success(out, config, summary)?,
        other => print_failure(out, config, other)?,
    }

    Ok(Outcome::Finished(verdict))
}

fn print_banner(out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "木模板开料机G-code生成程序 - EXE打包")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    Ok(())
}

fn print_missing_interpreter(out: &mut impl Write) -> Result<()> {
    writeln!(out, "❌ 错误: 未找到Python，请先安装Python {}.{}或更高版本", MIN_SUPPORTED.major, MIN_SUPPORTED.minor)?;
    writeln!(out, "   下载地址: {}", DOWNLOAD_URL)?;
    writeln!(out, "   安装时请勾选 \"Add Python to PATH\"")?;
    Ok(())
}

fn print_success(out: &mut impl Write, config: &BuildConfig, summary: &ArchiveSummary) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "{}", SUCCESS_HEADLINE)?;
    writeln!(
        out,
        "📦 客户交付文件: {} ({}, {} 个文件)",
        config.artifact_name(),
        summary.display_size(),
        summary.entries
    )?;
    writeln!(out, "💡 请将ZIP文件发送给客户，客户解压后双击EXE即可使用")?;
    writeln!(out, "{}", RULE)?;
    Ok(())
}

fn print_failure(out: &mut impl Write, config: &BuildConfig, verdict: &Verdict) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", FAILURE_HEADLINE)?;
    writeln!(out, "   原因: {}", describe_failure(config, verdict))?;
    Ok(())
}

fn describe_failure(config: &BuildConfig, verdict: &Verdict) -> String {
    let name = config.artifact_name();
    match verdict {
        Verdict::Missing => format!("未生成 {}", name),
        Verdict::Stale => format!("{} 未被本次打包更新（可能是上次遗留的旧文件）", name),
        Verdict::BuildFailed { code: Some(code) } => format!("打包脚本退出码 {}", code),
        Verdict::BuildFailed { code: None } => "打包脚本未能启动或被中断".to_string(),
        Verdict::Corrupt(reason) => format!("{} 不是有效的ZIP文件: {}", name, reason),
        Verdict::Delivered(_) => String::new(),
    }
}

/// Reports what a build would use without running it.
pub fn doctor(system: &impl SystemOps, config: &BuildConfig, out: &mut impl Write) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "                 Build Environment Report")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;

    // 1. Interpreters
    let reports = interpreter::probe_all(system, config);
    writeln!(out, "1. PYTHON INTERPRETERS ({} found)", reports.len())?;
    for report in &reports {
        match &report.banner {
            Some(banner) => writeln!(out, "   ✓ {} [{}] {}", report.candidate.path.display(), report.candidate.source, banner)?,
            None => writeln!(out, "   ✕ {} [{}] did not answer --version", report.candidate.path.display(), report.candidate.source)?,
        }
    }
    let chosen = reports.iter().find(|r| r.banner.is_some());
    match chosen {
        Some(report) => writeln!(out, "   → A build would use {}", report.candidate.path.display())?,
        None => {
            writeln!(out, "   ⚠ Problem: no usable interpreter. Install Python {}+ from {}", MIN_SUPPORTED, DOWNLOAD_URL)?;
        }
    }

    // 2. Packaging script
    writeln!(out)?;
    writeln!(out, "2. PACKAGING SCRIPT")?;
    if system.path_exists(&config.script) {
        writeln!(out, "   ✓ {}", config.script.display())?;
    } else {
        writeln!(out, "   ⚠ Problem: {} not found", config.script.display())?;
    }

    // 3. Artifact
    writeln!(out)?;
    writeln!(out, "3. DELIVERY ARTIFACT")?;
    match system.artifact_stamp(&config.artifact) {
        None => writeln!(out, "   {} does not exist yet", config.artifact.display())?,
        Some(_) => match system.inspect_archive(&config.artifact) {
            Ok(summary) => writeln!(
                out,
                "   {} exists from an earlier build ({}, {} files); a new build must rewrite it",
                config.artifact.display(),
                summary.display_size(),
                summary.entries
            )?,
            Err(e) => writeln!(out, "   ⚠ {} exists but is unreadable: {:#}", config.artifact.display(), e)?,
        },
    }

    writeln!(out)?;
    writeln!(out, "───────────────────────────────────────────────────────────────")?;
    if chosen.is_some() && system.path_exists(&config.script) {
        writeln!(out, "✓ Ready to build. Run 'build-exe' to package.")?;
    } else {
        writeln!(out, "Fix the problems above before running 'build-exe'.")?;
    }
    writeln!(out)?;
    Ok(())
}
