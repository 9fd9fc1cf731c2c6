// src/error.rs
//! Error types for the assembly engine
//!
//! Every rule-related variant carries the declaration site of the rule that
//! triggered it so the message points the packager at the manifest entry to
//! fix. Use [`Error::code`] for a stable, suppressible identifier.

use thiserror::Error;

/// Result type used throughout the engine
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required pattern matched nothing
    #[error("There were no matches for \"{pattern}\" in {search_dirs}{skipped} (definition: {site})")]
    UnmatchedPattern {
        pattern: String,
        search_dirs: String,
        /// Human readable explanation of paths skipped because of earlier rules
        skipped: String,
        site: String,
    },

    /// A path was claimed twice outside a multi-destination rule
    #[error(
        "The path \"{path}\" is already claimed by {claimant}; it cannot also be installed into {package} (definition: {site})"
    )]
    OverlappingInstall {
        path: String,
        package: String,
        claimant: String,
        site: String,
    },

    /// A rename (`as` or single-target move) matched more than one path
    #[error("The pattern \"{pattern}\" must match exactly one path but matched {matches} (definition: {site})")]
    AmbiguousRename {
        pattern: String,
        matches: String,
        site: String,
    },

    /// A declared rule was never triggered
    #[error("The {kind} rule defined at {site} was never used{detail}")]
    UnusedRule {
        kind: String,
        site: String,
        detail: String,
    },

    /// Malformed or statically impossible condition
    #[error("Invalid condition at {site}: {reason}")]
    InvalidCondition { site: String, reason: String },

    /// A symlink could not be created because of its replacement rule
    #[error(
        "Refusing to replace \"{path}\" with a symlink: replacement rule \"{rule}\" forbids it ({reason}) (definition: {site})"
    )]
    ReplacementPolicyViolation {
        path: String,
        rule: String,
        reason: String,
        site: String,
    },

    /// A move would have overwritten a directory
    #[error(
        "Moving \"{source_path}\" to \"{target}\" would overwrite the directory \"{target}\"; remove it first (definition: {site})"
    )]
    DirectoryMergeConflict {
        source_path: String,
        target: String,
        site: String,
    },

    /// A path pattern could not be parsed
    #[error("Invalid path pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A rule is malformed or cannot be applied as written
    #[error("Invalid rule at {site}: {reason}")]
    InvalidRule { site: String, reason: String },

    /// An existing path has the wrong kind for the requested operation
    #[error("Path conflict at \"{path}\": {reason} (definition: {site})")]
    PathConflict {
        path: String,
        reason: String,
        site: String,
    },

    /// A service rule could not be mapped to a detected service
    #[error("Cannot resolve service \"{service}\" in package {package}: {reason} (definition: {site})")]
    ServiceResolution {
        service: String,
        package: String,
        reason: String,
        site: String,
    },

    /// Search directory ordering between packages is contradictory
    #[error("Search directory ordering is inconsistent between packages: {0}")]
    SearchDirCycle(String),

    /// Paths were left behind by every install rule
    #[error("{count} path(s) were not installed into any package: {paths}")]
    UninstalledPaths { count: usize, paths: String },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be deserialized
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    /// Engine configuration could not be deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Plan serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable identifier for diagnostics and suppression lists
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnmatchedPattern { .. } => "unmatched-pattern",
            Self::OverlappingInstall { .. } => "overlapping-install",
            Self::AmbiguousRename { .. } => "ambiguous-rename",
            Self::UnusedRule { .. } => "unused-rule",
            Self::InvalidCondition { .. } => "invalid-condition",
            Self::ReplacementPolicyViolation { .. } => "replacement-policy-violation",
            Self::DirectoryMergeConflict { .. } => "directory-merge-conflict",
            Self::InvalidPattern { .. } => "invalid-pattern",
            Self::InvalidRule { .. } => "invalid-rule",
            Self::PathConflict { .. } => "path-conflict",
            Self::ServiceResolution { .. } => "service-resolution",
            Self::SearchDirCycle(_) => "search-dir-cycle",
            Self::UninstalledPaths { .. } => "uninstalled-paths",
            Self::NotFound(_) => "not-found",
            Self::InvalidPath(_) => "invalid-path",
            Self::Io(_) => "io",
            Self::Manifest(_) => "manifest",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
        }
    }

    /// Declaration site of the offending rule, when the error has one
    pub fn site(&self) -> Option<&str> {
        match self {
            Self::UnmatchedPattern { site, .. }
            | Self::OverlappingInstall { site, .. }
            | Self::AmbiguousRename { site, .. }
            | Self::UnusedRule { site, .. }
            | Self::InvalidCondition { site, .. }
            | Self::ReplacementPolicyViolation { site, .. }
            | Self::DirectoryMergeConflict { site, .. }
            | Self::InvalidRule { site, .. }
            | Self::PathConflict { site, .. }
            | Self::ServiceResolution { site, .. } => Some(site),
            _ => None,
        }
    }

    pub(crate) fn invalid_rule(site: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            site: site.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_condition(site: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCondition {
            site: site.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn path_conflict(
        path: impl Into<String>,
        reason: impl Into<String>,
        site: impl Into<String>,
    ) -> Self {
        Self::PathConflict {
            path: path.into(),
            reason: reason.into(),
            site: site.into(),
        }
    }
}
