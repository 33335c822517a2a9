//! # Configuration
//!
//! Three layers, later wins:
//! 1. Built-in defaults (the delivery bundle this launcher was written for).
//! 2. An optional `build-exe.json` in the project directory (or `--config <FILE>`).
//! 3. Command line flags.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result, bail};
use log::debug;
use serde::Deserialize;

pub const DEFAULT_SCRIPT: &str = "build_exe.py";
pub const DEFAULT_ARTIFACT: &str = "木模板开料机-客户版.zip";
pub const CONFIG_FILE_NAME: &str = "build-exe.json";
pub const DEFAULT_INTERPRETERS: [&str; 3] = ["python", "python3", "py"];

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Working directory for the packaging script.
    pub project_dir: PathBuf,
    /// Absolute (or project-relative joined) path of the packaging script.
    pub script: PathBuf,
    /// Absolute (or project-relative joined) path of the expected ZIP.
    pub artifact: PathBuf,
    /// Skip discovery and use exactly this interpreter.
    pub python: Option<PathBuf>,
    /// Command names to look for, in preference order.
    pub interpreters: Vec<String>,
    /// Wait for a key press before exiting.
    pub pause: bool,
    /// Exit non-zero when nothing was delivered.
    pub strict: bool,
}

/// The on-disk JSON shape. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub script: Option<PathBuf>,
    pub artifact: Option<PathBuf>,
    pub python: Option<PathBuf>,
    pub interpreters: Option<Vec<String>>,
    pub pause: Option<bool>,
    pub strict: Option<bool>,
}

/// Values taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub artifact: Option<PathBuf>,
    pub python: Option<PathBuf>,
    pub no_pause: bool,
    pub strict: bool,
}

impl BuildConfig {
    /// Defaults rooted at `project_dir`.
    pub fn with_defaults(project_dir: PathBuf) -> Self {
        Self {
            script: project_dir.join(DEFAULT_SCRIPT),
            artifact: project_dir.join(DEFAULT_ARTIFACT),
            python: None,
            interpreters: DEFAULT_INTERPRETERS.iter().map(|s| s.to_string()).collect(),
            pause: true,
            strict: false,
            project_dir,
        }
    }

    /// Resolves all three layers against the launcher's working directory.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        Self::resolve_from(overrides, &cwd)
    }

    /// Resolves all three layers; relative CLI paths are anchored at `cwd`.
    ///
    /// `project_dir` always comes out absolute. The packaging script runs with it as its
    /// working directory, so a relative one would be applied twice.
    pub fn resolve_from(overrides: &Overrides, cwd: &Path) -> Result<Self> {
        let project_dir = match &overrides.project_dir {
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        };
        let mut config = Self::with_defaults(project_dir);

        let file = match &overrides.config {
            Some(path) => Some(load_file(&cwd.join(path))?),
            None => {
                let default_path = config.project_dir.join(CONFIG_FILE_NAME);
                if default_path.is_file() {
                    Some(load_file(&default_path)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            config.apply_file(file);
        }

        config.apply_overrides(overrides, cwd);
        config.validate()?;
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(script) = file.script {
            self.script = self.project_dir.join(script);
        }
        if let Some(artifact) = file.artifact {
            self.artifact = self.project_dir.join(artifact);
        }
        if let Some(python) = file.python {
            self.python = Some(anchor_program(&self.project_dir, python));
        }
        if let Some(interpreters) = file.interpreters {
            self.interpreters = interpreters;
        }
        if let Some(pause) = file.pause {
            self.pause = pause;
        }
        if let Some(strict) = file.strict {
            self.strict = strict;
        }
    }

    fn apply_overrides(&mut self, overrides: &Overrides, cwd: &Path) {
        // `join` keeps absolute paths as given
        if let Some(script) = &overrides.script {
            self.script = self.project_dir.join(script);
        }
        if let Some(artifact) = &overrides.artifact {
            self.artifact = self.project_dir.join(artifact);
        }
        if let Some(python) = &overrides.python {
            self.python = Some(anchor_program(cwd, python.clone()));
        }
        if overrides.no_pause {
            self.pause = false;
        }
        if overrides.strict {
            self.strict = true;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.python.is_none() && self.interpreters.iter().all(|n| n.trim().is_empty()) {
            bail!("No interpreter names configured; set \"interpreters\" or pass --python");
        }
        if self.artifact.file_name().is_none() {
            bail!("Artifact path {:?} does not name a file", self.artifact);
        }
        Ok(())
    }

    /// The artifact's file name, for messages.
    pub fn artifact_name(&self) -> String {
        self.artifact
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.artifact.display().to_string())
    }
}

/// Anchors a relative interpreter path like `venv/bin/python` at `base`.
/// A bare name (`python.exe`) is left for the OS to look up on PATH.
fn anchor_program(base: &Path, program: PathBuf) -> PathBuf {
    if program.is_relative() && program.components().count() > 1 {
        base.join(program)
    } else {
        program
    }
}

/// Reads and parses a JSON config file.
pub fn load_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config file {:?}", path))
}
