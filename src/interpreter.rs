//! # Interpreter Selection
//!
//! Turns discovery candidates into one usable interpreter by running each one's
//! `--version` until something answers with a Python banner.

use std::fmt;
use std::path::PathBuf;
use log::{debug, info};
use crate::config::BuildConfig;
use crate::discovery::Candidate;
use crate::system::SystemOps;

/// Oldest Python the packaging script accepts.
pub const MIN_SUPPORTED: PythonVersion = PythonVersion { major: 3, minor: 8, patch: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    /// Parses a `--version` banner such as `Python 3.11.4` or `Python 3.13.0rc1`.
    pub fn parse_banner(banner: &str) -> Option<Self> {
        let version = banner.trim().strip_prefix("Python")?.split_whitespace().next()?;
        let mut parts = version.split('.');
        let major = leading_number(parts.next()?)?;
        let minor = leading_number(parts.next()?)?;
        let patch = parts.next().and_then(leading_number).unwrap_or(0);
        Some(Self { major, minor, patch })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// `"0rc1"` -> 0, `"12"` -> 12, `"rc"` -> None
fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// An interpreter that answered the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub path: PathBuf,
    pub source: &'static str,
    pub banner: String,
    pub version: Option<PythonVersion>,
}

impl Interpreter {
    /// Unparseable versions get the benefit of the doubt; the script checks again itself.
    pub fn is_supported(&self) -> bool {
        self.version.is_none_or(|v| v >= MIN_SUPPORTED)
    }
}

/// One probe, for the doctor report.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub candidate: Candidate,
    pub banner: Option<String>,
}

/// Candidates in probe order: the explicit override alone, or discovery.
pub fn candidates(system: &impl SystemOps, config: &BuildConfig) -> Vec<Candidate> {
    match &config.python {
        Some(explicit) => vec![Candidate::new(explicit.clone(), "explicit")],
        None => system.discover_interpreters(&config.interpreters),
    }
}

/// Probes candidates in order and returns the first that looks like Python.
pub fn locate(system: &impl SystemOps, config: &BuildConfig) -> Option<Interpreter> {
    for candidate in candidates(system, config) {
        if let Some(interpreter) = probe(system, &candidate) {
            info!(
                "Using {:?} ({}, found via {})",
                interpreter.path, interpreter.banner, interpreter.source
            );
            return Some(interpreter);
        }
    }
    None
}

/// Probes every candidate; nothing is short-circuited.
pub fn probe_all(system: &impl SystemOps, config: &BuildConfig) -> Vec<ProbeReport> {
    candidates(system, config)
        .into_iter()
        .map(|candidate| {
            let banner = probe(system, &candidate).map(|i| i.banner);
            ProbeReport { candidate, banner }
        })
        .collect()
}

fn probe(system: &impl SystemOps, candidate: &Candidate) -> Option<Interpreter> {
    let banner = system.probe_interpreter(&candidate.path)?;
    if !banner.starts_with("Python") {
        debug!("{:?} answered --version with {:?}; not Python", candidate.path, banner);
        return None;
    }
    Some(Interpreter {
        path: candidate.path.clone(),
        source: candidate.source,
        version: PythonVersion::parse_banner(&banner),
        banner,
    })
}
