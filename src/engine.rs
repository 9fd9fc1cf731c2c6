// src/engine.rs
//! Assembly engine
//!
//! Drives one assembly run:
//! 1. Resolve the package set and the per-package search directory order
//! 2. Scan the search directories in parallel into a [`PathIndex`]
//! 3. Evaluate the installation rules into one tree per built package
//! 4. Report paths nobody installed or discarded
//! 5. Run each package's transformations and resolve its services
//! 6. Fail on unused rules, then build the [`AssemblyPlan`]

use crate::condition::BuildContext;
use crate::config::{EngineConfig, UninstalledPolicy};
use crate::error::{Error, Result};
use crate::filesystem::scan_all;
use crate::index::PathIndex;
use crate::install::{InstallEvaluator, determine_search_dir_order};
use crate::manifest::Manifest;
use crate::package::{PackageSet, load_control};
use crate::plan::{AssemblyPlan, PackagePlan};
use crate::plugin::CapabilityRegistry;
use crate::transform::PackageTransformer;
use crate::usage::{Diagnostic, Severity, UsageTracker};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How many uninstalled paths an error message lists
const MAX_LISTED_PATHS: usize = 10;

pub struct Assembler {
    root: PathBuf,
    config: EngineConfig,
    build: BuildContext,
    registry: CapabilityRegistry,
}

impl Assembler {
    /// Create an assembler for the source package at `root`
    ///
    /// Registers the built-in capabilities and loads every configured plugin
    /// descriptor (relative paths are resolved against `root`).
    pub fn new(root: impl Into<PathBuf>, config: EngineConfig, build: BuildContext) -> Result<Self> {
        let root = root.into();
        let mut registry = CapabilityRegistry::builtin()?;
        for plugin in &config.plugins {
            let path = root.join(plugin);
            let loaded = registry.load_descriptor(&path)?;
            debug!("Plugin {} registered {} capabilities", path.display(), loaded);
        }
        Ok(Self {
            root,
            config,
            build,
            registry,
        })
    }

    /// Replace the capability registry
    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(&self) -> &BuildContext {
        &self.build
    }

    /// Load the control file, resolved against the build context
    pub fn load_packages(&self) -> Result<PackageSet> {
        let defs = load_control(&self.root.join(&self.config.control))?;
        PackageSet::resolve(&defs, &self.build)
    }

    /// Load the manifest; a missing manifest has no rules
    pub fn load_manifest(&self, packages: &PackageSet) -> Result<Manifest> {
        let path = self.root.join(&self.config.manifest);
        if !path.exists() {
            info!("No manifest at {}; nothing is installed by rules", path.display());
            return Ok(Manifest::default());
        }
        Manifest::load(&path, packages, &self.build)
    }

    /// Load control and manifest from disk and assemble
    pub fn run(&self) -> Result<AssemblyPlan> {
        let packages = self.load_packages()?;
        let manifest = self.load_manifest(&packages)?;
        self.assemble(&packages, &manifest)
    }

    pub fn assemble(&self, packages: &PackageSet, manifest: &Manifest) -> Result<AssemblyPlan> {
        let mut usage = UsageTracker::new();
        let mut diagnostics = Vec::new();
        let suppressions = self.config.suppressions();

        let mut index = self.build_index(packages, manifest)?;
        let outcome =
            InstallEvaluator::new(&mut index, packages, &self.build, &mut usage).run(&manifest.installations)?;
        let mut trees = outcome.trees;

        for diagnostic in self.detect_uninstalled(&index)? {
            if !suppressions.is_suppressed(&diagnostic.code, diagnostic.site.as_deref()) {
                diagnostics.push(diagnostic);
            }
        }

        let mut plans = Vec::new();
        for package in packages.iter() {
            let rules = manifest.transformations(&package.name);
            let Some(mut tree) = trees.remove(&package.name) else {
                for rule in rules {
                    usage.declare(&rule.id());
                    usage.skip_not_applicable(&rule.id());
                }
                debug!("{} is not built; skipping its transformations", package.name);
                continue;
            };
            let transformer =
                PackageTransformer::new(package, &self.build, self.registry.service_detectors());
            let transformed = transformer.apply(&mut tree, rules, &mut usage)?;
            let plan = PackagePlan::from_tree(&package.name, &package.arch, &tree, transformed);
            info!(
                "{}: {} path(s), {} service(s)",
                plan.name,
                plan.entries.len(),
                plan.services.len()
            );
            plans.push(plan);
        }

        usage.check(&suppressions)?;
        for id in usage.unused() {
            diagnostics.push(
                Diagnostic::new(
                    Severity::Info,
                    "unused-rule",
                    format!("{} rule never matched (suppressed)", id.kind),
                )
                .with_site(&id.site),
            );
        }

        AssemblyPlan::new(plans, outcome.auto_discarded, diagnostics)
    }

    fn build_index(&self, packages: &PackageSet, manifest: &Manifest) -> Result<PathIndex> {
        let names = packages.names();
        let overrides = manifest.requested_search_dirs();
        let requested: BTreeMap<String, Vec<String>> = names
            .iter()
            .map(|name| {
                let dirs = overrides
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.config.search_dirs_for(name));
                (name.clone(), dirs)
            })
            .collect();
        let order = determine_search_dir_order(&names, &requested, &[], &self.config.source_root)?;

        let roots: Vec<PathBuf> = order.iter().map(|d| self.resolve(&d.path)).collect();
        let scans = scan_all(&roots)?;
        let scans = order
            .into_iter()
            .zip(scans)
            .map(|(dir, scan)| (dir.path, dir.applies_to, scan))
            .collect();
        let index = PathIndex::build(scans, &self.registry);
        info!(
            "Indexed {} path(s) in {} search dir(s)",
            index.len(),
            index.search_dirs().len()
        );
        Ok(index)
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        if relative == "." {
            self.root.clone()
        } else {
            self.root.join(Path::new(relative))
        }
    }

    /// Report unclaimed paths below the check directories
    fn detect_uninstalled(&self, index: &PathIndex) -> Result<Vec<Diagnostic>> {
        if self.config.uninstalled == UninstalledPolicy::Ignore {
            return Ok(Vec::new());
        }
        let mut missing = Vec::new();
        for check in &self.config.check_dirs {
            let Some(dir) = index.search_dirs().iter().position(|d| &d.name == check) else {
                debug!("Check directory {} is not a search directory", check);
                continue;
            };
            for id in index.detect_missing(dir) {
                missing.push(format!("{}/{}", check, index.entry(id).path));
            }
        }
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        match self.config.uninstalled {
            UninstalledPolicy::Error => {
                let mut listed = missing
                    .iter()
                    .take(MAX_LISTED_PATHS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                if missing.len() > MAX_LISTED_PATHS {
                    listed.push_str(", ...");
                }
                Err(Error::UninstalledPaths {
                    count: missing.len(),
                    paths: listed,
                })
            }
            _ => Ok(missing
                .into_iter()
                .map(|path| {
                    warn!("{} was not installed into any package", path);
                    Diagnostic::new(
                        Severity::Warning,
                        "uninstalled-path",
                        format!("{path} was not installed into any package nor discarded"),
                    )
                    .with_site(path)
                })
                .collect()),
        }
    }
}
