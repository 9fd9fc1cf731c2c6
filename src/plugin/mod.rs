// src/plugin/mod.rs
//! Capability registry
//!
//! Plugins extend the engine through capabilities. Declarative capabilities
//! (discard records) are plain data and can be loaded from a TOML plugin
//! descriptor without running any code. Executable capabilities implement a
//! fixed trait ([`DiscardCheck`], [`ServiceDetector`]) and are only invoked
//! by the assembly engine. Static consumers should use
//! [`CapabilityRegistry::declarative_only`].
//!
//! # Plugin descriptor format
//!
//! ```toml
//! [[discard]]
//! name = "foo-build-stamps"
//! description = "Build stamps left by foo"
//! basenames = [".foo-stamp"]
//! suffixes = [".stamp"]
//! under = "usr/share/foo"
//! ```

pub mod discard;

pub use discard::{DiscardCandidate, DiscardCheck, DiscardRecord, DoxygenCruft, PathSelector};

use crate::error::{Error, Result};
use crate::service::{ServiceDetector, SystemdDetector, SysvInitDetector};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Kind of a registered capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    DiscardRule,
    ServiceManager,
}

/// Summary of a capability, safe to show without executing anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub kind: CapabilityKind,
    pub description: String,
    pub executable: bool,
}

/// Discard record as written in a plugin descriptor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct DiscardDescriptor {
    pub name: String,
    pub description: String,
    pub basenames: Vec<String>,
    pub directory_names: Vec<String>,
    pub paths: Vec<String>,
    pub suffixes: Vec<String>,
    pub under: Option<String>,
    pub regex: Option<String>,
}

/// Top level of a plugin descriptor file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginDescriptor {
    pub discard: Vec<DiscardDescriptor>,
}

impl DiscardDescriptor {
    fn into_record(self, origin: &str) -> Result<DiscardRecord> {
        if self.name.is_empty() {
            return Err(Error::invalid_rule(origin, "discard capability without a name"));
        }
        let mut record = DiscardRecord::new(&self.name, &self.description);
        if !self.basenames.is_empty() {
            record = record.with_selector(PathSelector::Basenames(
                self.basenames.into_iter().collect::<BTreeSet<_>>(),
            ));
        }
        if !self.directory_names.is_empty() {
            record = record.with_selector(PathSelector::DirectoryNames(
                self.directory_names.into_iter().collect(),
            ));
        }
        for path in self.paths {
            record = record.with_selector(PathSelector::ExactPath(
                crate::matcher::normalize_relative(&path),
            ));
        }
        if !self.suffixes.is_empty() {
            record = record.with_selector(PathSelector::FileSuffix {
                suffixes: self.suffixes,
                under: self.under.map(|u| crate::matcher::normalize_relative(&u)),
            });
        }
        if let Some(pattern) = self.regex {
            let anchored = format!("^(?:{pattern})$");
            let regex = Regex::new(&anchored).map_err(|e| Error::InvalidPattern {
                pattern,
                reason: e.to_string(),
            })?;
            record = record.with_selector(PathSelector::BasenameRegex(regex));
        }
        if record.selectors.is_empty() {
            return Err(Error::invalid_rule(
                origin,
                format!("discard capability \"{}\" selects nothing", record.name),
            ));
        }
        Ok(record)
    }
}

/// Registered capabilities, in registration order
#[derive(Default)]
pub struct CapabilityRegistry {
    discard_records: Vec<DiscardRecord>,
    discard_checks: Vec<Box<dyn DiscardCheck>>,
    service_detectors: Vec<Box<dyn ServiceDetector>>,
}

impl CapabilityRegistry {
    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in discard rules and service managers
    pub fn builtin() -> Result<Self> {
        let records = discard::builtin_records().map_err(|e| Error::InvalidPattern {
            pattern: "builtin discard rules".to_string(),
            reason: e.to_string(),
        })?;
        let mut registry = Self::empty();
        for record in records {
            registry.register_discard_record(record);
        }
        registry.register_discard_check(Box::new(DoxygenCruft));
        registry.register_service_detector(Box::new(SystemdDetector));
        registry.register_service_detector(Box::new(SysvInitDetector));
        Ok(registry)
    }

    pub fn register_discard_record(&mut self, record: DiscardRecord) {
        debug!("Registered discard rule {}", record.name);
        self.discard_records.push(record);
    }

    pub fn register_discard_check(&mut self, check: Box<dyn DiscardCheck>) {
        debug!("Registered executable discard rule {}", check.name());
        self.discard_checks.push(check);
    }

    pub fn register_service_detector(&mut self, detector: Box<dyn ServiceDetector>) {
        debug!("Registered service manager {}", detector.manager());
        self.service_detectors.push(detector);
    }

    /// Parse a plugin descriptor and register its declarative capabilities
    pub fn load_descriptor_str(&mut self, content: &str, origin: &str) -> Result<usize> {
        let descriptor: PluginDescriptor = toml::from_str(content)?;
        let mut loaded = 0;
        for entry in descriptor.discard {
            self.register_discard_record(entry.into_record(origin)?);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Load a plugin descriptor file
    pub fn load_descriptor(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let loaded = self.load_descriptor_str(&content, &path.display().to_string())?;
        info!("Loaded {} capability record(s) from {}", loaded, path.display());
        Ok(loaded)
    }

    /// Name of the first discard rule claiming the candidate
    pub fn auto_discard_verdict(&self, candidate: &DiscardCandidate<'_>) -> Option<&str> {
        if let Some(record) = self.discard_records.iter().find(|r| r.should_discard(candidate)) {
            return Some(&record.name);
        }
        self.discard_checks
            .iter()
            .find(|c| c.should_discard(candidate))
            .map(|c| c.name())
    }

    pub fn service_detectors(&self) -> &[Box<dyn ServiceDetector>] {
        &self.service_detectors
    }

    pub fn has_service_manager(&self, manager: &str) -> bool {
        self.service_detectors.iter().any(|d| d.manager() == manager)
    }

    /// Every registered capability, declarative and executable
    pub fn capabilities(&self) -> Vec<CapabilityInfo> {
        let mut all = self.declarative_only().capabilities();
        all.extend(self.discard_checks.iter().map(|c| CapabilityInfo {
            name: c.name().to_string(),
            kind: CapabilityKind::DiscardRule,
            description: c.description().to_string(),
            executable: true,
        }));
        all.extend(self.service_detectors.iter().map(|d| CapabilityInfo {
            name: d.manager().to_string(),
            kind: CapabilityKind::ServiceManager,
            description: d.description().to_string(),
            executable: true,
        }));
        all
    }

    /// View limited to data-only capabilities
    pub fn declarative_only(&self) -> DeclarativeCapabilities<'_> {
        DeclarativeCapabilities {
            records: &self.discard_records,
        }
    }
}

/// Data-only view of a registry; never runs plugin code
#[derive(Debug, Clone, Copy)]
pub struct DeclarativeCapabilities<'a> {
    records: &'a [DiscardRecord],
}

impl DeclarativeCapabilities<'_> {
    pub fn records(&self) -> &[DiscardRecord] {
        self.records
    }

    pub fn auto_discard_verdict(&self, candidate: &DiscardCandidate<'_>) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.should_discard(candidate))
            .map(|r| r.name.as_str())
    }

    pub fn capabilities(&self) -> Vec<CapabilityInfo> {
        self.records
            .iter()
            .map(|r| CapabilityInfo {
                name: r.name.clone(),
                kind: CapabilityKind::DiscardRule,
                description: r.description.clone(),
                executable: false,
            })
            .collect()
    }
}
