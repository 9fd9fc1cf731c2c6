// src/transform/mod.rs
//! Per-package transformation pipeline
//!
//! Transformations run strictly in declaration order against one package's
//! tree. Every rule sees the tree exactly as the previous rule left it, and
//! no rule can observe another package. Patterns are resolved eagerly, before
//! the rule mutates anything.
//!
//! Two rule kinds do not touch the tree: clean-after-removal specs are
//! collected for maintainer script generation, and service rules are
//! resolved against the final tree once every other rule has run.

mod clean;
mod ops;

pub use clean::{CleanSpec, DeleteOn};

use crate::condition::{BuildContext, Condition, ConditionContext};
use crate::error::Result;
use crate::filesystem::{Account, FileMode, PackageTree};
use crate::matcher::PathPattern;
use crate::package::ResolvedPackage;
use crate::service::{ServiceDetector, ServiceRecord, ServiceRule, resolve_services};
use crate::usage::{RuleId, RuleKind, UsageTracker};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, info};

/// What `create-symlink` does when its path already exists
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReplacementRule {
    ErrorIfExists,
    ErrorIfDirectory,
    #[default]
    AbortOnNonEmptyDirectory,
    DiscardExisting,
}

/// The transformation variants
#[derive(Debug, Clone)]
pub enum TransformKind {
    Remove {
        paths: Vec<PathPattern>,
        keep_empty_parent_dirs: bool,
    },
    Move {
        source: PathPattern,
        /// A trailing `/` makes the target a directory to move into
        target: String,
    },
    CreateSymlink {
        path: String,
        target: String,
        replacement: ReplacementRule,
    },
    CreateDirectories {
        paths: Vec<String>,
        owner: Option<Account>,
        group: Option<Account>,
        mode: Option<FileMode>,
    },
    PathMetadata {
        paths: Vec<PathPattern>,
        owner: Option<Account>,
        group: Option<Account>,
        mode: Option<FileMode>,
        capabilities: Option<String>,
        capability_mode: Option<FileMode>,
        recursive: bool,
    },
    CleanAfterRemoval(CleanSpec),
    Service(ServiceRule),
}

/// One entry of a package's `transformations` (or `services`) list
#[derive(Debug, Clone)]
pub struct TransformationRule {
    /// Declaration site, e.g. `packages.foo.transformations[1].move`
    pub site: String,
    pub condition: Option<Condition>,
    pub kind: TransformKind,
}

impl TransformationRule {
    pub fn new(site: impl Into<String>, kind: TransformKind) -> Self {
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
            TransformKind::Remove { .. } => RuleKind::Remove,
            TransformKind::Move { .. } => RuleKind::Move,
            TransformKind::CreateSymlink { .. } => RuleKind::CreateSymlink,
            TransformKind::CreateDirectories { .. } => RuleKind::CreateDirectories,
            TransformKind::PathMetadata { .. } => RuleKind::PathMetadata,
            TransformKind::CleanAfterRemoval(_) => RuleKind::CleanAfterRemoval,
            TransformKind::Service(_) => RuleKind::Service,
        }
    }

    pub fn id(&self) -> RuleId {
        match &self.kind {
            TransformKind::Service(rule) => rule.id(),
            _ => RuleId::new(self.rule_kind(), &self.site),
        }
    }
}

/// What a package's pipeline produced besides its tree
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub services: Vec<ServiceRecord>,
    pub clean: Vec<CleanSpec>,
}

/// Runs one package's transformations
pub struct PackageTransformer<'a> {
    package: &'a ResolvedPackage,
    build: &'a BuildContext,
    detectors: &'a [Box<dyn ServiceDetector>],
}

impl<'a> PackageTransformer<'a> {
    pub fn new(
        package: &'a ResolvedPackage,
        build: &'a BuildContext,
        detectors: &'a [Box<dyn ServiceDetector>],
    ) -> Self {
        Self {
            package,
            build,
            detectors,
        }
    }

    pub fn apply(
        &self,
        tree: &mut PackageTree,
        rules: &[TransformationRule],
        usage: &mut UsageTracker,
    ) -> Result<TransformOutcome> {
        let name = self.package.name.as_str();
        let ctx = ConditionContext::package(self.build, name, &self.package.arch);
        for rule in rules {
            usage.declare(&rule.id());
        }

        let mut outcome = TransformOutcome::default();
        let mut service_rules = Vec::new();

        for rule in rules {
            let id = rule.id();
            if let TransformKind::Service(service) = &rule.kind {
                service_rules.push(service.clone());
                continue;
            }
            if let Some(condition) = &rule.condition {
                if !condition.evaluate(&ctx).map_err(|e| e.at(&rule.site))? {
                    debug!("{}: condition is false", rule.site);
                    usage.skip_condition_false(&id);
                    continue;
                }
            }

            let count = match &rule.kind {
                TransformKind::Remove {
                    paths,
                    keep_empty_parent_dirs,
                } => ops::remove(tree, name, &rule.site, paths, *keep_empty_parent_dirs)?,
                TransformKind::Move { source, target } => {
                    ops::move_paths(tree, name, &rule.site, source, target)?
                }
                TransformKind::CreateSymlink {
                    path,
                    target,
                    replacement,
                } => ops::create_symlink(tree, &rule.site, path, target, *replacement)?,
                TransformKind::CreateDirectories {
                    paths,
                    owner,
                    group,
                    mode,
                } => ops::create_directories(
                    tree,
                    &rule.site,
                    paths,
                    owner.as_ref(),
                    group.as_ref(),
                    mode.as_ref(),
                )?,
                TransformKind::PathMetadata {
                    paths,
                    owner,
                    group,
                    mode,
                    capabilities,
                    capability_mode,
                    recursive,
                } => ops::path_metadata(
                    tree,
                    name,
                    &rule.site,
                    paths,
                    &ops::MetadataChange {
                        owner: owner.as_ref(),
                        group: group.as_ref(),
                        mode: mode.as_ref(),
                        capabilities: capabilities.as_deref(),
                        capability_mode: capability_mode.as_ref(),
                    },
                    *recursive,
                )?,
                TransformKind::CleanAfterRemoval(spec) => {
                    outcome.clean.push(spec.clone());
                    1
                }
                TransformKind::Service(_) => 0,
            };
            info!("{}: {} applied to {} path(s)", rule.site, rule.rule_kind(), count);
            usage.record(&id, count);
        }

        outcome.services = resolve_services(name, tree, self.detectors, &service_rules, &ctx, usage)?;
        Ok(outcome)
    }
}
