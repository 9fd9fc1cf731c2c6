// src/install/mod.rs
//! Installation rules
//!
//! Installation rules are evaluated once, in manifest order, against the
//! shared [`PathIndex`](crate::index::PathIndex). Each rule claims the paths
//! its patterns match; a claimed or discarded path is never matched again.

pub mod evaluator;
mod manpage;
pub mod search_order;

pub use evaluator::{InstallEvaluator, InstallOutcome};
pub use manpage::{ManLanguage, man_destination};
pub use search_order::{OrderedSearchDir, determine_search_dir_order};

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::matcher::PathPattern;
use crate::package::PackageSet;
use crate::usage::{RuleId, RuleKind};

/// Where an `install` or `install-docs` match ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The rule's default location
    Default,
    /// Below this directory, keeping the basename
    DestDir(String),
    /// Exactly this path; the source must match a single path
    As(String),
}

/// Destinations of a `multi-dest-install`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiDestination {
    DestDirs(Vec<String>),
    As(Vec<String>),
}

impl MultiDestination {
    fn len(&self) -> usize {
        match self {
            Self::DestDirs(dirs) => dirs.len(),
            Self::As(paths) => paths.len(),
        }
    }
}

/// The install rule variants
#[derive(Debug, Clone)]
pub enum InstallKind {
    Install {
        sources: Vec<PathPattern>,
        dest: Destination,
        into: String,
    },
    MultiDestInstall {
        sources: Vec<PathPattern>,
        dest: MultiDestination,
        into: Vec<String>,
    },
    InstallDocs {
        sources: Vec<PathPattern>,
        dest: Destination,
        into: String,
    },
    InstallExamples {
        sources: Vec<PathPattern>,
        into: String,
    },
    InstallMan {
        sources: Vec<PathPattern>,
        section: Option<String>,
        language: Option<ManLanguage>,
        into: String,
    },
    Discard {
        patterns: Vec<PathPattern>,
        /// Limit the discard to these search directories
        search_dirs: Option<Vec<String>>,
    },
}

/// One entry of the manifest's `installations` list
#[derive(Debug, Clone)]
pub struct InstallationRule {
    /// Declaration site, e.g. `installations[3].install`
    pub site: String,
    pub condition: Option<Condition>,
    pub kind: InstallKind,
}

impl InstallationRule {
    pub fn new(site: impl Into<String>, kind: InstallKind) -> Self {
        Self {
            site: site.into(),
            condition: None,
            kind,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn rule_kind(&self) -> RuleKind {
        match &self.kind {
            InstallKind::Install { .. } => RuleKind::Install,
            InstallKind::MultiDestInstall { .. } => RuleKind::MultiDestInstall,
            InstallKind::InstallDocs { .. } => RuleKind::InstallDocs,
            InstallKind::InstallExamples { .. } => RuleKind::InstallExamples,
            InstallKind::InstallMan { .. } => RuleKind::InstallMan,
            InstallKind::Discard { .. } => RuleKind::Discard,
        }
    }

    pub fn id(&self) -> RuleId {
        RuleId::new(self.rule_kind(), &self.site)
    }

    pub fn sources(&self) -> &[PathPattern] {
        match &self.kind {
            InstallKind::Install { sources, .. }
            | InstallKind::MultiDestInstall { sources, .. }
            | InstallKind::InstallDocs { sources, .. }
            | InstallKind::InstallExamples { sources, .. }
            | InstallKind::InstallMan { sources, .. } => sources,
            InstallKind::Discard { patterns, .. } => patterns,
        }
    }

    /// Target packages; empty for discard rules
    pub fn into_packages(&self) -> Vec<&str> {
        match &self.kind {
            InstallKind::Install { into, .. }
            | InstallKind::InstallDocs { into, .. }
            | InstallKind::InstallExamples { into, .. }
            | InstallKind::InstallMan { into, .. } => vec![into.as_str()],
            InstallKind::MultiDestInstall { into, .. } => into.iter().map(String::as_str).collect(),
            InstallKind::Discard { .. } => Vec::new(),
        }
    }

    /// Documentation rules only apply when docs are built
    pub fn is_documentation(&self) -> bool {
        matches!(
            self.kind,
            InstallKind::InstallDocs { .. }
                | InstallKind::InstallExamples { .. }
                | InstallKind::InstallMan { .. }
        )
    }

    /// A rename: each source must match exactly one path
    pub fn requires_single_match(&self) -> bool {
        matches!(
            self.kind,
            InstallKind::Install {
                dest: Destination::As(_),
                ..
            } | InstallKind::InstallDocs {
                dest: Destination::As(_),
                ..
            } | InstallKind::MultiDestInstall {
                dest: MultiDestination::As(_),
                ..
            }
        )
    }

    /// Structural checks that do not need the filesystem
    pub fn validate(&self, packages: &PackageSet) -> Result<()> {
        if self.sources().is_empty() {
            return Err(Error::invalid_rule(&self.site, "no source patterns given"));
        }
        if self.requires_single_match() && self.sources().len() != 1 {
            return Err(Error::invalid_rule(
                &self.site,
                "\"as\" requires exactly one source pattern",
            ));
        }
        if let InstallKind::MultiDestInstall { dest, into, .. } = &self.kind {
            if dest.len() < 2 {
                return Err(Error::invalid_rule(
                    &self.site,
                    "multi-dest-install needs at least two destinations",
                ));
            }
            if into.is_empty() {
                return Err(Error::invalid_rule(&self.site, "\"into\" names no package"));
            }
        }
        for package in self.into_packages() {
            if !packages.contains(package) {
                return Err(Error::invalid_rule(
                    &self.site,
                    format!("unknown package \"{package}\" in \"into\""),
                ));
            }
        }
        Ok(())
    }
}
