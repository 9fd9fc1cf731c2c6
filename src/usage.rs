// src/usage.rs
//! Rule usage tracking and diagnostics
//!
//! Every declared rule is registered up front. Evaluation records how many
//! paths each rule touched; a rule left at zero whose condition held is an
//! error, since it is either shadowed by an earlier rule or stale.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::debug;

/// Manifest keyword of a rule
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr, Serialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    Install,
    InstallDocs,
    InstallMan,
    InstallExamples,
    MultiDestInstall,
    Discard,
    Remove,
    Move,
    CreateSymlink,
    CreateDirectories,
    PathMetadata,
    CleanAfterRemoval,
    Service,
}

/// Stable identity of a declared rule: its kind plus where it was declared
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RuleId {
    pub kind: RuleKind,
    pub site: String,
}

impl RuleId {
    pub fn new(kind: RuleKind, site: impl Into<String>) -> Self {
        Self {
            kind,
            site: site.into(),
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.site)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exemption {
    None,
    ConditionFalse,
    NotApplicable,
}

#[derive(Debug, Clone)]
struct RuleUsage {
    id: RuleId,
    matches: usize,
    exemption: Exemption,
}

/// Match counters per declared rule, kept in declaration order
#[derive(Debug, Default)]
pub struct UsageTracker {
    rules: Vec<RuleUsage>,
    positions: HashMap<RuleId, usize>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule; declaring the same rule twice is a no-op
    pub fn declare(&mut self, id: &RuleId) {
        if self.positions.contains_key(id) {
            return;
        }
        self.positions.insert(id.clone(), self.rules.len());
        self.rules.push(RuleUsage {
            id: id.clone(),
            matches: 0,
            exemption: Exemption::None,
        });
    }

    fn entry(&mut self, id: &RuleId) -> &mut RuleUsage {
        self.declare(id);
        let pos = self.positions[id];
        &mut self.rules[pos]
    }

    /// Add `count` matches to a rule
    pub fn record(&mut self, id: &RuleId, count: usize) {
        let usage = self.entry(id);
        usage.matches += count;
        debug!("Rule {} matched {} path(s) (total {})", id, count, usage.matches);
    }

    /// The rule's condition evaluated to false
    pub fn skip_condition_false(&mut self, id: &RuleId) {
        self.entry(id).exemption = Exemption::ConditionFalse;
    }

    /// The rule only targets packages that are not built
    pub fn skip_not_applicable(&mut self, id: &RuleId) {
        let usage = self.entry(id);
        if usage.exemption == Exemption::None {
            usage.exemption = Exemption::NotApplicable;
        }
    }

    pub fn count(&self, id: &RuleId) -> usize {
        self.positions
            .get(id)
            .map(|&pos| self.rules[pos].matches)
            .unwrap_or(0)
    }

    /// Rules never used despite being active, in declaration order
    pub fn unused(&self) -> impl Iterator<Item = &RuleId> {
        self.rules
            .iter()
            .filter(|u| u.matches == 0 && u.exemption == Exemption::None)
            .map(|u| &u.id)
    }

    /// Fail on the first unused rule that is not suppressed
    pub fn check(&self, suppressions: &Suppressions) -> Result<()> {
        let unused: Vec<&RuleId> = self
            .unused()
            .filter(|id| !suppressions.is_suppressed("unused-rule", Some(&id.site)))
            .collect();
        let Some(first) = unused.first() else {
            return Ok(());
        };
        let detail = match unused.len() {
            1 => String::new(),
            n => format!(" ({} other unused rule(s) follow)", n - 1),
        };
        Err(Error::UnusedRule {
            kind: first.kind.to_string(),
            site: first.site.clone(),
            detail,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A reportable finding with a stable id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            site: None,
            message: message.into(),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn from_error(err: &Error) -> Self {
        Self {
            severity: Severity::Error,
            code: err.code().to_string(),
            site: err.site().map(str::to_string),
            message: err.to_string(),
        }
    }

    /// `code` or `code@site`, the form used in suppression lists
    pub fn id(&self) -> String {
        match &self.site {
            Some(site) => format!("{}@{}", self.code, site),
            None => self.code.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}[{}]: {}", self.code, self.message)
    }
}

/// Diagnostic ids the packager chose to silence
#[derive(Debug, Clone, Default)]
pub struct Suppressions(BTreeSet<String>);

impl Suppressions {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_suppressed(&self, code: &str, site: Option<&str>) -> bool {
        self.0.contains(code)
            || site.is_some_and(|site| self.0.contains(&format!("{code}@{site}")))
    }
}
