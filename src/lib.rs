// src/lib.rs

//! pkgassemble: declarative package assembly
//!
//! Turns the files a build installed into one or more staging directories
//! into the final filesystem trees of the binary packages, driven by a YAML
//! manifest.
//!
//! # Architecture
//!
//! - Path index: every search directory is scanned once; each path carries a
//!   claim (unclaimed, installed, discarded) shared by all rules
//! - Installation rules: evaluated in manifest order, first claim wins
//! - Package trees: one virtual tree per built package, mutated by the
//!   package's transformations in declaration order
//! - Capabilities: automatic discard rules and service managers registered
//!   through a plugin registry
//! - Usage tracking: every rule must match something unless suppressed

pub mod condition;
pub mod config;
pub mod engine;
mod error;
pub mod filesystem;
pub mod index;
pub mod install;
pub mod manifest;
pub mod matcher;
pub mod package;
pub mod plan;
pub mod plugin;
pub mod service;
pub mod transform;
pub mod usage;

pub use condition::{BuildContext, Condition, ConditionContext, PackageArch};
pub use config::{EngineConfig, SearchDirConfig, UninstalledPolicy};
pub use engine::Assembler;
pub use error::{Error, Result};
pub use filesystem::{PackageTree, ScannedDir};
pub use index::PathIndex;
pub use install::{InstallEvaluator, InstallationRule};
pub use manifest::Manifest;
pub use matcher::PathPattern;
pub use package::{PackageDef, PackageSet, ResolvedPackage};
pub use plan::{AssemblyPlan, PackagePlan, PlanEntry};
pub use plugin::CapabilityRegistry;
pub use service::{ServiceRecord, ServiceRule};
pub use transform::{PackageTransformer, TransformationRule};
pub use usage::{Diagnostic, RuleId, RuleKind, Severity, Suppressions, UsageTracker};
