// src/filesystem/scan.rs
//! Search directory scanning
//!
//! Scans never follow symlinks. Entries are sorted by file name so the
//! resulting index is identical between runs. Several directories are
//! scanned in parallel and returned in the order they were requested.

use crate::error::{Error, Result};
use rayon::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Kind of a scanned path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    File,
    Directory,
    Symlink { target: String },
}

/// One path found below a search directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Path relative to the search directory, `/` separated
    pub path: String,
    pub kind: ScanKind,
    pub mode: u32,
    pub fs_path: PathBuf,
}

/// Result of scanning a single search directory
#[derive(Debug, Clone, Default)]
pub struct ScannedDir {
    pub root: PathBuf,
    pub exists: bool,
    /// Parents always precede their children
    pub entries: Vec<ScanEntry>,
}

impl ScannedDir {
    /// Build a scan result without touching the filesystem
    ///
    /// `dir/` denotes a directory, `link -> target` a symlink, anything else
    /// a regular file. Missing parents are added as directories.
    pub fn from_paths(root: impl Into<PathBuf>, paths: &[&str]) -> Self {
        let root = root.into();
        let mut entries: Vec<ScanEntry> = Vec::new();
        let mut seen = std::collections::BTreeMap::new();

        for spec in paths {
            let (path, kind) = match spec.split_once(" -> ") {
                Some((link, target)) => (
                    link.trim_matches('/'),
                    ScanKind::Symlink {
                        target: target.to_string(),
                    },
                ),
                None if spec.ends_with('/') => (spec.trim_matches('/'), ScanKind::Directory),
                None => (spec.trim_matches('/'), ScanKind::File),
            };
            let mut prefix = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for (i, segment) in segments.iter().enumerate() {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(segment);
                let entry_kind = if i + 1 == segments.len() {
                    kind.clone()
                } else {
                    ScanKind::Directory
                };
                seen.entry(prefix.clone()).or_insert(entry_kind);
            }
        }

        for (path, kind) in seen {
            let mode = match kind {
                ScanKind::File => 0o644,
                ScanKind::Directory => 0o755,
                ScanKind::Symlink { .. } => 0o777,
            };
            entries.push(ScanEntry {
                fs_path: root.join(&path),
                path,
                kind,
                mode,
            });
        }

        Self {
            root,
            exists: true,
            entries,
        }
    }
}

/// Scan one directory; a missing directory yields an empty, non-existent scan
pub fn scan_dir(root: &Path) -> Result<ScannedDir> {
    if !root.is_dir() {
        debug!("Search directory {} does not exist", root.display());
        return Ok(ScannedDir {
            root: root.to_path_buf(),
            exists: false,
            entries: Vec::new(),
        });
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(|e| {
            Error::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory loop while scanning")),
            )
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let rel = rel
            .to_str()
            .ok_or_else(|| Error::InvalidPath(format!("non UTF-8 path: {}", rel.display())))?
            .to_string();

        let metadata = fs::symlink_metadata(entry.path())?;
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            ScanKind::Symlink {
                target: target.to_string_lossy().into_owned(),
            }
        } else if file_type.is_dir() {
            ScanKind::Directory
        } else {
            ScanKind::File
        };

        entries.push(ScanEntry {
            path: rel,
            kind,
            mode: metadata.permissions().mode() & 0o7777,
            fs_path: entry.path().to_path_buf(),
        });
    }

    info!("Scanned {} path(s) in {}", entries.len(), root.display());
    Ok(ScannedDir {
        root: root.to_path_buf(),
        exists: true,
        entries,
    })
}

/// Scan several directories in parallel, preserving the requested order
pub fn scan_all(roots: &[PathBuf]) -> Result<Vec<ScannedDir>> {
    roots.par_iter().map(|root| scan_dir(root)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_from_paths_adds_parents() {
        let scan = ScannedDir::from_paths("/build", &["usr/bin/foo", "usr/share/doc/", "usr/lib/x -> y"]);
        let paths: Vec<&str> = scan.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["usr", "usr/bin", "usr/bin/foo", "usr/lib", "usr/lib/x", "usr/share", "usr/share/doc"]
        );
        assert_eq!(scan.entries[2].kind, ScanKind::File);
        assert_eq!(
            scan.entries[4].kind,
            ScanKind::Symlink {
                target: "y".to_string()
            }
        );
        assert_eq!(scan.entries[6].kind, ScanKind::Directory);
    }

    #[test]
    fn test_scan_dir_does_not_follow_symlinks() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::write(root.join("usr/bin/foo"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(root.join("usr/bin/foo"), fs::Permissions::from_mode(0o755)).unwrap();
        symlink("bin", root.join("usr/sbin")).unwrap();

        let scan = scan_dir(root).unwrap();
        assert!(scan.exists);
        let paths: Vec<&str> = scan.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["usr", "usr/bin", "usr/bin/foo", "usr/sbin"]);
        assert_eq!(scan.entries[2].mode, 0o755);
        assert_eq!(
            scan.entries[3].kind,
            ScanKind::Symlink {
                target: "bin".to_string()
            }
        );
    }

    #[test]
    fn test_scan_missing_dir() {
        let temp = tempfile::tempdir().unwrap();
        let scans = scan_all(&[temp.path().join("missing"), temp.path().to_path_buf()]).unwrap();
        assert_eq!(scans.len(), 2);
        assert!(!scans[0].exists);
        assert!(scans[1].exists);
        assert!(scans[1].entries.is_empty());
    }
}
