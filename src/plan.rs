// src/plan.rs
//! Assembly plan
//!
//! The plan is the engine's output: for every built package the sorted list
//! of final paths with their kind, ownership, mode and origin, plus the
//! resolved services and maintainer script fragments. It serializes to JSON
//! and carries a SHA-256 digest over its canonical form, so two runs over
//! the same inputs can be compared by digest alone.

use crate::condition::PackageArch;
use crate::error::Result;
use crate::filesystem::metadata::serialize_mode;
use crate::filesystem::{NodeKind, PackageTree, Provenance};
use crate::service::ServiceRecord;
use crate::transform::{CleanSpec, TransformOutcome};
use crate::usage::Diagnostic;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One path of a package's final tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub path: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(serialize_with = "serialize_mode")]
    pub mode: u32,
    pub owner: String,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,
    /// Absent for directories created implicitly or by a rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackagePlan {
    pub name: String,
    pub architecture: String,
    pub entries: Vec<PlanEntry>,
    pub services: Vec<ServiceRecord>,
    pub clean_after_removal: Vec<CleanSpec>,
}

impl PackagePlan {
    pub fn from_tree(
        name: &str,
        arch: &PackageArch,
        tree: &PackageTree,
        outcome: TransformOutcome,
    ) -> Self {
        let mut entries = Vec::with_capacity(tree.len());
        tree.walk(|_, node, path| {
            if path.is_empty() {
                return;
            }
            let meta = node.meta();
            entries.push(PlanEntry {
                path: path.to_string(),
                kind: node.kind().clone(),
                mode: meta.mode,
                owner: meta.owner.to_string(),
                group: meta.group.to_string(),
                capabilities: meta.capabilities.clone(),
                source: node.source().cloned(),
            });
        });
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let architecture = match arch {
            PackageArch::Independent => "all".to_string(),
            PackageArch::Concrete(arch) => arch.clone(),
        };
        Self {
            name: name.to_string(),
            architecture,
            entries,
            services: outcome.services,
            clean_after_removal: outcome.clean,
        }
    }

    pub fn entry(&self, path: &str) -> Option<&PlanEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Concatenated `postrm` fragments, if any
    pub fn postrm_snippet(&self) -> Option<String> {
        if self.clean_after_removal.is_empty() {
            return None;
        }
        Some(
            self.clean_after_removal
                .iter()
                .map(|spec| spec.snippet.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// Result of a complete assembly run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssemblyPlan {
    pub packages: Vec<PackagePlan>,
    /// Paths discarded per automatic discard rule
    pub auto_discarded: BTreeMap<String, usize>,
    pub diagnostics: Vec<Diagnostic>,
    pub digest: String,
}

/// The part of the plan the digest covers
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Canonical<'a> {
    packages: &'a [PackagePlan],
    auto_discarded: &'a BTreeMap<String, usize>,
}

impl AssemblyPlan {
    pub fn new(
        mut packages: Vec<PackagePlan>,
        auto_discarded: BTreeMap<String, usize>,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<Self> {
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        let canonical = serde_json::to_vec(&Canonical {
            packages: &packages,
            auto_discarded: &auto_discarded,
        })?;
        let digest = hex::encode(Sha256::digest(&canonical));
        Ok(Self {
            packages,
            auto_discarded,
            diagnostics,
            digest,
        })
    }

    pub fn package(&self, name: &str) -> Option<&PackagePlan> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
