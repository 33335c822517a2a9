//! # Discovery Module
//!
//! Finds Python interpreters that the packaging script could be run with.
//! The batch launcher this replaces only ever tried `python` on the PATH; we look a little
//! harder so a machine with Python installed but not on PATH still builds.
//!
//! ## Discovery Strategies
//!
//! 1.  **Existing PATH**: Every PATH directory, in order, so the result matches what a shell
//!     would run first.
//! 2.  **Registry Scanning** (Windows): PEP 514 keys under
//!     `Software\Python\PythonCore\<tag>\InstallPath` in `HKCU` and `HKLM`.
//! 3.  **Common Locations**: `%LOCALAPPDATA%\Programs\Python\*`, `~/.local/bin`, pyenv shims.
//!
//! The result is an ordered, de-duplicated list of executables. Nothing here runs them;
//! probing is the interpreter module's job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use log::{debug, trace};

/// Extensions Windows will launch directly from a bare command name.
#[cfg(windows)]
const LAUNCHABLE_EXTENSIONS: [&str; 4] = ["exe", "cmd", "bat", "com"];

/// A potential interpreter executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Full path to the executable file.
    pub path: PathBuf,
    /// Where it was found ("path", "registry", "common", "explicit").
    pub source: &'static str,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>, source: &'static str) -> Self {
        Self { path: path.into(), source }
    }
}

/// The main entry point for discovery.
///
/// `names` are command stems in preference order (e.g. `python`, `python3`, `py`).
/// Within one directory, earlier names win; across directories, earlier strategies
/// and earlier PATH entries win.
pub fn discover_candidates(names: &[String]) -> Vec<Candidate> {
    let mut found = Vec::new();

    // 1. PATH, exactly as the shell would search it
    scan_existing_path(&mut found, names);

    // 2. Registered installations
    #[cfg(windows)]
    scan_registry_python(&mut found);

    // 3. Well-known per-user install locations
    scan_common_locations(&mut found, names);

    dedup_candidates(found)
}

/// Scans the current `PATH` environment variable.
fn scan_existing_path(found: &mut Vec<Candidate>, names: &[String]) {
    if let Some(path_var) = std::env::var_os("PATH") {
        scan_dirs(found, std::env::split_paths(&path_var), names, "path");
    }
}

/// Scans each directory in order. Missing directories are skipped silently;
/// stale PATH entries are common and not our problem to report.
pub fn scan_dirs(
    found: &mut Vec<Candidate>,
    dirs: impl IntoIterator<Item = PathBuf>,
    names: &[String],
    source: &'static str,
) {
    for dir in dirs {
        if dir.as_os_str().is_empty() || !dir.is_dir() {
            continue;
        }
        add_dir_candidates(found, &dir, names, source);
    }
}

/// Reads PEP 514 registrations.
///
/// Prefers the `ExecutablePath` value; falls back to `python.exe` inside the
/// default value of `InstallPath`.
#[cfg(windows)]
fn scan_registry_python(found: &mut Vec<Candidate>) {
    use windows_registry::{CURRENT_USER, LOCAL_MACHINE};

    let key_path = r"SOFTWARE\Python\PythonCore";

    for hive in [CURRENT_USER, LOCAL_MACHINE] {
        let Ok(core_key) = hive.open(key_path) else {
            continue;
        };
        for tag in core_key.keys().into_iter().flatten() {
            let Ok(install_key) = core_key.open(format!(r"{}\InstallPath", tag)) else {
                continue;
            };
            let exe = install_key
                .get_string("ExecutablePath")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    install_key
                        .get_string("")
                        .ok()
                        .filter(|s| !s.is_empty())
                        .map(|dir| PathBuf::from(dir).join("python.exe"))
                });
            if let Some(exe) = exe.filter(|p| p.is_file()) {
                debug!("Registry lists Python {} at {:?}", tag, exe);
                found.push(Candidate::new(exe, "registry"));
            }
        }
    }
}

/// Scans "well-known" per-user install directories.
///
/// - python.org installer default (`%LOCALAPPDATA%\Programs\Python\Python3XX`)
/// - pip/pipx user bin (`~/.local/bin`)
/// - pyenv and pyenv-win shims
fn scan_common_locations(found: &mut Vec<Candidate>, names: &[String]) {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Some(base_dirs) = directories::BaseDirs::new() {
        let programs = base_dirs.data_local_dir().join("Programs").join("Python");
        if programs.is_dir() {
            let mut installs: Vec<PathBuf> = WalkDir::new(&programs)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_dir())
                .map(|e| e.into_path())
                .collect();
            // Python313 before Python38: newest install first
            installs.sort();
            installs.reverse();
            dirs.extend(installs);
        }
    }

    if let Some(user_dirs) = directories::UserDirs::new() {
        let home = user_dirs.home_dir();
        dirs.push(home.join(".local").join("bin"));
        dirs.push(home.join(".pyenv").join("shims"));
        dirs.push(home.join(".pyenv").join("pyenv-win").join("shims"));
    }

    scan_dirs(found, dirs, names, "common");
}

/// Scans a single directory (depth 1) for executables whose stem is one of `names`.
fn add_dir_candidates(found: &mut Vec<Candidate>, dir: &Path, names: &[String], source: &'static str) {
    debug!("Scanning directory: {:?}", dir);

    let mut hits: Vec<(usize, PathBuf)> = Vec::new();
    let walker = WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name();

    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(stem) = launchable_stem(path) else {
            continue;
        };
        if let Some(rank) = names.iter().position(|n| n.eq_ignore_ascii_case(&stem)) {
            trace!("Matched {:?} as '{}'", path, names[rank]);
            hits.push((rank, path.to_path_buf()));
        }
    }

    // Stable sort keeps file-name order among equal ranks
    hits.sort_by_key(|(rank, _)| *rank);
    found.extend(hits.into_iter().map(|(_, path)| Candidate::new(path, source)));
}

/// Returns the lowercase command name if `path` is something the OS would launch by name.
#[cfg(windows)]
fn launchable_stem(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if !LAUNCHABLE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().to_lowercase())
}

/// Returns the lowercase command name if `path` is an extension-less executable file.
#[cfg(not(windows))]
fn launchable_stem(path: &Path) -> Option<String> {
    if path.extension().is_some() {
        return None;
    }
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() || !is_executable(&meta) {
        return None;
    }
    Some(path.file_name()?.to_string_lossy().to_lowercase())
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(any(unix, windows)))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Drops later duplicates, comparing normalized paths.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(normalize_path(&c.path)))
        .collect()
}

/// Normalizes a path for comparison.
///
/// - Lowercases the string on Windows (case-insensitive filesystem).
fn normalize_path(p: &Path) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(p.to_string_lossy().to_lowercase())
    } else {
        p.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Creates a launchable file named `stem` in `dir` and returns its path.
    fn touch_exe(dir: &Path, stem: &str) -> PathBuf {
        let path = if cfg!(windows) {
            dir.join(format!("{}.exe", stem))
        } else {
            dir.join(stem)
        };
        std::fs::write(&path, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn names() -> Vec<String> {
        vec!["python".to_string(), "python3".to_string(), "py".to_string()]
    }

    #[test]
    fn test_scan_dirs_preserves_directory_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let a = touch_exe(second.path(), "python");
        let b = touch_exe(first.path(), "python3");

        let mut found = Vec::new();
        scan_dirs(
            &mut found,
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            &names(),
            "path",
        );

        let paths: Vec<_> = found.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![b, a]);
        assert!(found.iter().all(|c| c.source == "path"));
    }

    #[test]
    fn test_name_rank_wins_within_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let py = touch_exe(dir.path(), "py");
        let python = touch_exe(dir.path(), "python");

        let mut found = Vec::new();
        scan_dirs(&mut found, vec![dir.path().to_path_buf()], &names(), "path");

        let paths: Vec<_> = found.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![python, py]);
    }

    #[test]
    fn test_unrelated_and_missing_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch_exe(dir.path(), "pip");
        std::fs::write(dir.path().join("python.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("python3")).unwrap();

        let mut found = Vec::new();
        scan_dirs(
            &mut found,
            vec![dir.path().to_path_buf(), dir.path().join("does-not-exist"), PathBuf::new()],
            &names(),
            "path",
        );

        assert!(found.is_empty(), "unexpected candidates: {:?}", found);
    }

    #[test]
    fn test_names_match_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let upper = touch_exe(dir.path(), "PYTHON");

        let mut found = Vec::new();
        scan_dirs(&mut found, vec![dir.path().to_path_buf()], &names(), "common");

        assert_eq!(found, vec![Candidate::new(upper, "common")]);
    }

    #[test]
    fn test_same_dir_twice_on_path_yields_one_candidate() {
        let dir = tempfile::tempdir().unwrap();
        touch_exe(dir.path(), "python");

        let mut found = Vec::new();
        scan_dirs(
            &mut found,
            vec![dir.path().to_path_buf(), dir.path().to_path_buf()],
            &names(),
            "path",
        );

        assert_eq!(dedup_candidates(found).len(), 1);
    }

    proptest! {
        #[test]
        fn test_dedup_keeps_first_occurrence_order(
            picks in prop::collection::vec(0usize..6, 0..30)
        ) {
            let pool: Vec<PathBuf> = (0..6).map(|i| PathBuf::from(format!("/opt/py{}/python", i))).collect();
            let input: Vec<Candidate> = picks.iter().map(|&i| Candidate::new(pool[i].clone(), "path")).collect();

            let result = dedup_candidates(input);

            // No duplicates
            let unique: HashSet<&PathBuf> = result.iter().map(|c| &c.path).collect();
            prop_assert_eq!(unique.len(), result.len());

            // First-seen order preserved
            let mut expected: Vec<PathBuf> = Vec::new();
            for &i in &picks {
                if !expected.contains(&pool[i]) {
                    expected.push(pool[i].clone());
                }
            }
            let got: Vec<PathBuf> = result.into_iter().map(|c| c.path).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
