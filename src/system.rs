use std::path::Path;
#[cfg(test)]
use std::path::PathBuf;
use std::process::{Command, Stdio};
use anyhow::{Context, Result};
use log::debug;
use crate::artifact::{self, ArchiveSummary, ArtifactStamp};
use crate::discovery::{self, Candidate};

/// Exit status of the packaging script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptExit {
    /// `None` if the process never started or was terminated by a signal.
    pub code: Option<i32>,
}

impl ScriptExit {
    pub fn spawn_failed() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Abstraction for System interactions (interpreters, sub-processes, File System, console).
/// This lets the orchestration be tested without Python or a packaging script on the machine.
pub trait SystemOps {
    /// Find interpreter executables for the given command names, in preference order.
    fn discover_interpreters(&self, names: &[String]) -> Vec<Candidate>;

    /// Run `<exe> --version` and return the banner, or `None` if it did not run cleanly.
    fn probe_interpreter(&self, exe: &Path) -> Option<String>;

    /// Run the packaging script to completion with inherited stdio.
    fn run_packaging_script(&self, interpreter: &Path, script: &Path, workdir: &Path) -> Result<ScriptExit>;

    /// Snapshot the artifact's size and modification time.
    fn artifact_stamp(&self, path: &Path) -> Option<ArtifactStamp>;

    /// Open the artifact as a ZIP and summarize it.
    fn inspect_archive(&self, path: &Path) -> Result<ArchiveSummary>;

    /// Check if a file exists on the file system.
    fn path_exists(&self, path: &Path) -> bool;

    /// Block until the user acknowledges, so a double-clicked console stays open.
    fn wait_for_key(&self);
}

/// The Real System implementation (Production).
pub struct HostSystem;

impl SystemOps for HostSystem {
    fn discover_interpreters(&self, names: &[String]) -> Vec<Candidate> {
        discovery::discover_candidates(names)
    }

    fn probe_interpreter(&self, exe: &Path) -> Option<String> {
        let output = Command::new(exe)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| debug!("Probe of {:?} failed to start: {}", exe, e))
            .ok()?;

        if !output.status.success() {
            // The Windows Store alias lands here (exit 9009, no output).
            debug!("Probe of {:?} exited with {:?}", exe, output.status.code());
            return None;
        }

        // Python < 3.4 prints the banner to stderr
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let banner = if stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).trim().to_string()
        } else {
            stdout
        };
        (!banner.is_empty()).then_some(banner)
    }

    fn run_packaging_script(&self, interpreter: &Path, script: &Path, workdir: &Path) -> Result<ScriptExit> {
        let status = Command::new(interpreter)
            .arg(script)
            .current_dir(workdir)
            // The script prints Chinese text and emoji; keep it from dying on a GBK console.
            .env("PYTHONUTF8", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .status()
            .with_context(|| format!("Failed to execute {:?} {:?}", interpreter, script))?;
        Ok(ScriptExit { code: status.code() })
    }

    fn artifact_stamp(&self, path: &Path) -> Option<ArtifactStamp> {
        ArtifactStamp::read(path)
    }

    fn inspect_archive(&self, path: &Path) -> Result<ArchiveSummary> {
        artifact::inspect_archive(path)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn wait_for_key(&self) {
        #[cfg(windows)]
        {
            // Same prompt the batch file showed, in the console's own language.
            if let Ok(status) = Command::new("cmd").args(["/C", "pause"]).status() {
                if status.success() {
                    return;
                }
            }
        }

        use std::io::Write;
        print!("按回车键退出...");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
}

/// A Mock System for Testing.
///
/// Running the packaging script "produces" `produces` (if set) at its path, so the
/// before/after artifact checks see a real change.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockSystem {
    pub candidates: Vec<Candidate>,
    pub banners: std::collections::HashMap<PathBuf, String>,
    /// `None` makes the script fail to start.
    pub script_exit: Option<i32>,
    pub produces: Option<(PathBuf, ArtifactStamp)>,
    /// `None` makes archive inspection fail.
    pub archive: Option<ArchiveSummary>,
    pub files: std::sync::Mutex<std::collections::HashMap<PathBuf, ArtifactStamp>>,
    pub script_runs: std::sync::Mutex<Vec<(PathBuf, PathBuf, PathBuf)>>,
    pub probes: std::sync::Mutex<Vec<PathBuf>>,
    pub pause_count: std::sync::Mutex<usize>,
}

#[cfg(test)]
impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a discoverable interpreter. `banner: None` makes its probe fail.
    pub fn with_interpreter(mut self, path: &str, banner: Option<&str>) -> Self {
        let path = PathBuf::from(path);
        if let Some(banner) = banner {
            self.banners.insert(path.clone(), banner.to_string());
        }
        self.candidates.push(Candidate::new(path, "path"));
        self
    }

    pub fn with_existing_file(self, path: &Path, stamp: ArtifactStamp) -> Self {
        self.files.lock().unwrap().insert(path.to_path_buf(), stamp);
        self
    }

    pub fn with_build(mut self, exit: Option<i32>, produces: Option<(PathBuf, ArtifactStamp)>) -> Self {
        self.script_exit = exit;
        self.produces = produces;
        self
    }

    pub fn with_archive(mut self, summary: ArchiveSummary) -> Self {
        self.archive = Some(summary);
        self
    }

    pub fn script_run_count(&self) -> usize {
        self.script_runs.lock().unwrap().len()
    }

    pub fn pauses(&self) -> usize {
        *self.pause_count.lock().unwrap()
    }
}

#[cfg(test)]
impl SystemOps for MockSystem {
    fn discover_interpreters(&self, names: &[String]) -> Vec<Candidate> {
        self.candidates
            .iter()
            .filter(|c| {
                let stem = c.path.file_stem().map(|s| s.to_string_lossy().to_lowercase());
                stem.is_some_and(|stem| names.iter().any(|n| n.eq_ignore_ascii_case(&stem)))
            })
            .cloned()
            .collect()
    }

    fn probe_interpreter(&self, exe: &Path) -> Option<String> {
        self.probes.lock().unwrap().push(exe.to_path_buf());
        self.banners.get(exe).cloned()
    }

    fn run_packaging_script(&self, interpreter: &Path, script: &Path, workdir: &Path) -> Result<ScriptExit> {
        self.script_runs.lock().unwrap().push((
            interpreter.to_path_buf(),
            script.to_path_buf(),
            workdir.to_path_buf(),
        ));
        let code = self
            .script_exit
            .ok_or_else(|| anyhow::anyhow!("mock: program not found"))?;
        if let Some((path, stamp)) = &self.produces {
            self.files.lock().unwrap().insert(path.clone(), stamp.clone());
        }
        Ok(ScriptExit { code: Some(code) })
    }

    fn artifact_stamp(&self, path: &Path) -> Option<ArtifactStamp> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn inspect_archive(&self, path: &Path) -> Result<ArchiveSummary> {
        self.archive
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{:?} is not a readable ZIP archive", path))
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn wait_for_key(&self) {
        *self.pause_count.lock().unwrap() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_exit_success_requires_zero() {
        assert!(ScriptExit { code: Some(0) }.success());
        assert!(!ScriptExit { code: Some(1) }.success());
        assert!(!ScriptExit::spawn_failed().success());
    }

    #[test]
    fn test_probe_of_missing_executable_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("python-does-not-exist");
        assert_eq!(HostSystem.probe_interpreter(&missing), None);
    }

    #[test]
    fn test_run_of_missing_interpreter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("python-does-not-exist");
        let result = HostSystem.run_packaging_script(&missing, Path::new("build_exe.py"), dir.path());
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to execute"));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_reads_banner_from_stdout_or_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let write_script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        let modern = write_script("modern", "echo 'Python 3.12.1'");
        let legacy = write_script("legacy", "echo 'Python 2.7.18' >&2");
        let broken = write_script("broken", "exit 9");

        assert_eq!(HostSystem.probe_interpreter(&modern).as_deref(), Some("Python 3.12.1"));
        assert_eq!(HostSystem.probe_interpreter(&legacy).as_deref(), Some("Python 2.7.18"));
        assert_eq!(HostSystem.probe_interpreter(&broken), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_packaging_script_reports_exit_code_and_workdir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // A fake interpreter: runs the "script" argument with sh.
        let interpreter = dir.path().join("fake-python");
        std::fs::write(&interpreter, "#!/bin/sh\nexec sh \"$1\"\n").unwrap();
        std::fs::set_permissions(&interpreter, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::fs::write(dir.path().join("ok.sh"), "echo \"$PYTHONIOENCODING\" > marker.txt\n").unwrap();
        std::fs::write(dir.path().join("fail.sh"), "exit 3\n").unwrap();

        let exit = HostSystem
            .run_packaging_script(&interpreter, Path::new("ok.sh"), dir.path())
            .unwrap();
        assert!(exit.success());
        let marker = std::fs::read_to_string(dir.path().join("marker.txt")).unwrap();
        assert_eq!(marker.trim(), "utf-8");

        let exit = HostSystem
            .run_packaging_script(&interpreter, Path::new("fail.sh"), dir.path())
            .unwrap();
        assert_eq!(exit, ScriptExit { code: Some(3) });
    }
}
