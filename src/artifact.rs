//! # Artifact Checks
//!
//! Decides whether the packaging run actually delivered something.
//!
//! A bare "does the ZIP exist" check reports success for a ZIP left behind by an earlier run,
//! so we snapshot the file before the build and compare afterwards. A fresh file must also
//! come from a zero exit status and open as a ZIP archive.

use std::fs::File;
use std::path::Path;
use std::time::SystemTime;
use anyhow::{Context, Result};
use log::{debug, warn};
use zip::ZipArchive;
use crate::system::ScriptExit;

/// Size and modification time of the artifact at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl ArtifactStamp {
    /// Reads the stamp of a regular file; `None` if it does not exist (or is a directory).
    pub fn read(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// What we learned by opening the artifact as a ZIP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Archive size in bytes.
    pub size: u64,
    /// Number of file entries (directories excluded).
    pub entries: usize,
    /// Entry names ending in `.exe`.
    pub executables: Vec<String>,
}

impl ArchiveSummary {
    /// Size formatted for humans, e.g. `12.3 MB`.
    pub fn display_size(&self) -> String {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;
        let size = self.size as f64;
        if size >= MB {
            format!("{:.1} MB", size / MB)
        } else if size >= KB {
            format!("{:.1} KB", size / KB)
        } else {
            format!("{} B", self.size)
        }
    }
}

/// Opens `path` as a ZIP archive and lists what it carries.
pub fn inspect_archive(path: &Path) -> Result<ArchiveSummary> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let size = file.metadata().with_context(|| format!("Failed to stat {:?}", path))?.len();
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{:?} is not a readable ZIP archive", path))?;

    let mut entries = 0;
    let mut executables = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("Corrupt entry #{} in {:?}", i, path))?;
        if !entry.is_file() {
            continue;
        }
        entries += 1;
        if entry.name().to_lowercase().ends_with(".exe") {
            executables.push(entry.name().to_string());
        }
    }

    debug!("{:?}: {} bytes, {} entries, executables {:?}", path, size, entries, executables);
    Ok(ArchiveSummary { size, entries, executables })
}

/// The outcome of one packaging run, judged from the filesystem after it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A fresh, readable archive from a successful run.
    Delivered(ArchiveSummary),
    /// No artifact on disk.
    Missing,
    /// The artifact has the same size and modification time as before the run.
    ///
    /// On filesystems with coarse timestamps (FAT keeps 2 s, some network shares 1 s) a
    /// same-size rewrite inside that window also lands here; rebuild after a moment.
    Stale,
    /// The packaging script failed. Either it exited non-zero after rewriting the artifact,
    /// or (`code: None`) it never started or was killed by a signal.
    BuildFailed { code: Option<i32> },
    /// The artifact changed, but it is not a usable ZIP.
    Corrupt(String),
}

impl Verdict {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Verdict::Delivered(_))
    }
}

/// Judges a packaging run.
///
/// `inspect` is only called once the cheaper checks have passed.
pub fn judge(
    before: Option<&ArtifactStamp>,
    after: Option<&ArtifactStamp>,
    exit: &ScriptExit,
    inspect: impl FnOnce() -> Result<ArchiveSummary>,
) -> Verdict {
    // No exit code: the script never started or was killed. Whatever is on disk is not its work.
    if exit.code.is_none() {
        return Verdict::BuildFailed { code: None };
    }

    let Some(after) = after else {
        return Verdict::Missing;
    };

    if before == Some(after) {
        return Verdict::Stale;
    }

    if !exit.success() {
        return Verdict::BuildFailed { code: exit.code };
    }

    match inspect() {
        Ok(summary) => {
            if summary.executables.is_empty() {
                warn!("Archive has no .exe entry; the customer will have nothing to double-click");
            }
            Verdict::Delivered(summary)
        }
        Err(e) => Verdict::Corrupt(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, UNIX_EPOCH};
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn stamp(len: u64, secs: u64) -> ArtifactStamp {
        ArtifactStamp { len, modified: Some(UNIX_EPOCH + Duration::from_secs(secs)) }
    }

    fn summary() -> ArchiveSummary {
        ArchiveSummary { size: 10, entries: 1, executables: vec!["a.exe".into()] }
    }

    fn ok_exit() -> ScriptExit {
        ScriptExit { code: Some(0) }
    }

    #[test]
    fn test_missing_artifact_is_missing_regardless_of_exit() {
        let verdict = judge(None, None, &ok_exit(), || Ok(summary()));
        assert_eq!(verdict, Verdict::Missing);

        let verdict = judge(Some(&stamp(1, 1)), None, &ScriptExit { code: Some(1) }, || Ok(summary()));
        assert_eq!(verdict, Verdict::Missing);
    }

    #[test]
    fn test_script_that_never_started_is_a_build_failure_not_missing() {
        let verdict = judge(None, None, &ScriptExit::spawn_failed(), || Ok(summary()));
        assert_eq!(verdict, Verdict::BuildFailed { code: None });

        let old = stamp(100, 1);
        let verdict = judge(Some(&old), Some(&old.clone()), &ScriptExit::spawn_failed(), || Ok(summary()));
        assert_eq!(verdict, Verdict::BuildFailed { code: None });
    }

    #[test]
    fn test_same_second_same_size_rewrite_reads_as_stale() {
        // What a 1 s-resolution filesystem reports for a rewrite with identical size
        let before = stamp(4096, 1_700_000_000);
        let after = ArtifactStamp { len: 4096, modified: before.modified };
        let verdict = judge(Some(&before), Some(&after), &ok_exit(), || Ok(summary()));
        assert_eq!(verdict, Verdict::Stale);
    }

    #[test]
    fn test_unchanged_artifact_is_stale() {
        let old = stamp(100, 1_700_000_000);
        let verdict = judge(Some(&old), Some(&old.clone()), &ok_exit(), || {
            panic!("stale artifacts must not be inspected")
        });
        assert_eq!(verdict, Verdict::Stale);
    }

    #[test]
    fn test_fresh_artifact_from_failed_script_is_not_delivered() {
        let verdict = judge(None, Some(&stamp(5, 2)), &ScriptExit { code: Some(1) }, || Ok(summary()));
        assert_eq!(verdict, Verdict::BuildFailed { code: Some(1) });

        let verdict = judge(None, Some(&stamp(5, 2)), &ScriptExit { code: None }, || Ok(summary()));
        assert_eq!(verdict, Verdict::BuildFailed { code: None });
    }

    #[test]
    fn test_rewritten_artifact_is_delivered() {
        let verdict = judge(Some(&stamp(5, 1)), Some(&stamp(5, 2)), &ok_exit(), || Ok(summary()));
        assert_eq!(verdict, Verdict::Delivered(summary()));
    }

    #[test]
    fn test_unreadable_archive_is_corrupt() {
        let verdict = judge(None, Some(&stamp(5, 2)), &ok_exit(), || anyhow::bail!("bad magic"));
        assert_eq!(verdict, Verdict::Corrupt("bad magic".into()));
    }

    #[test]
    fn test_inspect_archive_counts_files_and_executables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        {
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            let options = SimpleFileOptions::default();
            zip.add_directory("木模板开料机-客户版/", options).unwrap();
            zip.start_file("木模板开料机-客户版/木模板开料机程序.exe", options).unwrap();
            zip.write_all(b"MZ").unwrap();
            zip.start_file("木模板开料机-客户版/使用说明.txt", options).unwrap();
            zip.write_all("双击EXE启动".as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let summary = inspect_archive(&path).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.executables, vec!["木模板开料机-客户版/木模板开料机程序.exe".to_string()]);
        assert_eq!(summary.size, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_inspect_archive_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, b"this is not a zip").unwrap();

        let err = inspect_archive(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("not a readable ZIP archive"));
    }

    #[test]
    fn test_stamp_of_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ArtifactStamp::read(dir.path()), None);
        assert_eq!(ArtifactStamp::read(&dir.path().join("nope.zip")), None);

        let file = dir.path().join("a.zip");
        std::fs::write(&file, b"1234").unwrap();
        assert_eq!(ArtifactStamp::read(&file).map(|s| s.len), Some(4));
    }

    #[test]
    fn test_display_size() {
        let mut s = summary();
        s.size = 512;
        assert_eq!(s.display_size(), "512 B");
        s.size = 2048;
        assert_eq!(s.display_size(), "2.0 KB");
        s.size = 13 * 1024 * 1024 + 300 * 1024;
        assert_eq!(s.display_size(), "13.3 MB");
    }
}
