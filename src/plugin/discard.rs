// src/plugin/discard.rs
//! Automatic discard rules
//!
//! These describe paths an upstream build commonly leaves behind that never
//! belong in a package: bytecode caches, libtool archives, editor backups,
//! VCS metadata and the like. Most are declarative records; the doxygen
//! check needs to look at sibling files and is registered as an executable
//! capability.

use regex::Regex;
use std::collections::BTreeSet;

/// What a discard rule sees of a path
#[derive(Debug, Clone, Copy)]
pub struct DiscardCandidate<'a> {
    /// Path relative to the search directory
    pub path: &'a str,
    pub name: &'a str,
    pub is_dir: bool,
    pub is_file: bool,
    /// Names of the other entries in the same directory
    pub siblings: &'a [&'a str],
}

/// Declarative path selector
#[derive(Debug, Clone)]
pub enum PathSelector {
    /// Any path whose basename is in the set
    Basenames(BTreeSet<String>),
    /// Directories with one of these basenames
    DirectoryNames(BTreeSet<String>),
    /// Basename matches the (anchored) regex
    BasenameRegex(Regex),
    /// Exact relative path
    ExactPath(String),
    /// Files with one of the suffixes, optionally only below a directory
    FileSuffix {
        suffixes: Vec<String>,
        under: Option<String>,
    },
}

impl PathSelector {
    fn selects(&self, candidate: &DiscardCandidate<'_>) -> bool {
        match self {
            Self::Basenames(names) => names.contains(candidate.name),
            Self::DirectoryNames(names) => candidate.is_dir && names.contains(candidate.name),
            Self::BasenameRegex(regex) => regex.is_match(candidate.name),
            Self::ExactPath(path) => candidate.path == path,
            Self::FileSuffix { suffixes, under } => {
                candidate.is_file
                    && suffixes.iter().any(|s| candidate.name.ends_with(s.as_str()))
                    && under.as_ref().is_none_or(|dir| {
                        candidate
                            .path
                            .strip_prefix(dir.as_str())
                            .is_some_and(|rest| rest.starts_with('/'))
                    })
            }
        }
    }
}

/// A named, declarative discard rule
#[derive(Debug, Clone)]
pub struct DiscardRecord {
    pub name: String,
    pub description: String,
    pub selectors: Vec<PathSelector>,
}

impl DiscardRecord {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            selectors: Vec::new(),
        }
    }

    pub fn with_selector(mut self, selector: PathSelector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn should_discard(&self, candidate: &DiscardCandidate<'_>) -> bool {
        self.selectors.iter().any(|s| s.selects(candidate))
    }
}

/// Executable discard rule
pub trait DiscardCheck: Send + Sync {
    /// Rule name for logging and reports
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn should_discard(&self, candidate: &DiscardCandidate<'_>) -> bool;
}

/// Doxygen `.md5`/`.map` files next to a generated doxygen index
pub struct DoxygenCruft;

impl DiscardCheck for DoxygenCruft {
    fn name(&self) -> &str {
        "doxygen-cruft-files"
    }

    fn description(&self) -> &str {
        "Discards doxygen .md5 and .map files in generated HTML documentation"
    }

    fn should_discard(&self, candidate: &DiscardCandidate<'_>) -> bool {
        if !candidate.is_file
            || !(candidate.name.ends_with(".md5") || candidate.name.ends_with(".map"))
        {
            return false;
        }
        ["doxygen.css", "doxygen.svg", "index.html"]
            .iter()
            .all(|marker| candidate.siblings.contains(marker))
    }
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

const VCS_PATHS: &[&str] = &[
    ".arch-inventory",
    ".arch-ids",
    ".be",
    ".bzrbackup",
    ".bzrignore",
    ".bzrtags",
    ".cvsignore",
    ".hg",
    ".hgignore",
    ".hgtags",
    ".hgsigs",
    ".git",
    ".gitignore",
    ".gitattributes",
    ".gitmodules",
    ".gitreview",
    ".mailmap",
    ".mtn-ignore",
    ".svn",
    "{arch}",
    "CVS",
    "RCS",
    "_MTN",
    "_darcs",
];

/// The always-on declarative discard rules
pub fn builtin_records() -> Result<Vec<DiscardRecord>, regex::Error> {
    let backup =
        Regex::new(r"^(?:.*~|.*[.](?:bak|orig|rej)|[.]#.*|[.].*[.]sw.|[.]shelf|,,.*|DEADJOE)$")?;

    Ok(vec![
        DiscardRecord::new("python-cache-files", "Python bytecode caches")
            .with_selector(PathSelector::DirectoryNames(names(&["__pycache__"])))
            .with_selector(PathSelector::FileSuffix {
                suffixes: vec![".pyc".to_string(), ".pyo".to_string()],
                under: None,
            }),
        DiscardRecord::new("la-files", "Libtool .la files below usr/lib").with_selector(
            PathSelector::FileSuffix {
                suffixes: vec![".la".to_string()],
                under: Some("usr/lib".to_string()),
            },
        ),
        DiscardRecord::new("backup-files", "Editor and patch backup files")
            .with_selector(PathSelector::BasenameRegex(backup)),
        DiscardRecord::new("version-control-paths", "Version control metadata")
            .with_selector(PathSelector::Basenames(names(VCS_PATHS))),
        DiscardRecord::new("gnu-info-dir-file", "The generated GNU info directory index")
            .with_selector(PathSelector::ExactPath("usr/share/info/dir".to_string())),
        DiscardRecord::new("debian-dir", "Control metadata directory at the root")
            .with_selector(PathSelector::ExactPath("DEBIAN".to_string())),
    ])
}
