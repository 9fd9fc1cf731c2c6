// src/config.rs
//! Engine configuration
//!
//! Loaded from a TOML file next to the manifest:
//!
//! ```toml
//! uninstalled = "error"
//! suppress = ["unused-rule@installations[3].install"]
//!
//! [[search-dirs]]
//! path = "debian/tmp"
//!
//! [[search-dirs]]
//! path = "debian/tmp-udeb"
//! applies-to = ["foo-udeb"]
//! ```
//!
//! Every field has a default, so an empty file (or no file) is valid.

use crate::error::{Error, Result};
use crate::usage::Suppressions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::debug;

/// What to do with search directory paths no rule installed or discarded
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UninstalledPolicy {
    Ignore,
    #[default]
    Warn,
    Error,
}

/// A configured search directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SearchDirConfig {
    /// Relative to the source package root
    pub path: String,
    /// Only search this directory for these packages
    #[serde(default)]
    pub applies_to: Option<Vec<String>>,
}

impl SearchDirConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            applies_to: None,
        }
    }

    fn applies_to(&self, package: &str) -> bool {
        self.applies_to
            .as_ref()
            .is_none_or(|packages| packages.iter().any(|p| p == package))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Searched last, for every package
    pub source_root: String,
    pub control: PathBuf,
    pub manifest: PathBuf,
    /// In priority order
    pub search_dirs: Vec<SearchDirConfig>,
    pub uninstalled: UninstalledPolicy,
    /// Search directories checked for uninstalled paths
    pub check_dirs: Vec<String>,
    /// Diagnostic ids to silence: `<code>` or `<code>@<site>`
    pub suppress: Vec<String>,
    /// Plugin descriptor files
    pub plugins: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_root: ".".to_string(),
            control: PathBuf::from("debian/control"),
            manifest: PathBuf::from("debian/pkgassemble.manifest"),
            search_dirs: vec![SearchDirConfig::new("debian/tmp")],
            uninstalled: UninstalledPolicy::default(),
            check_dirs: vec!["debian/tmp".to_string()],
            suppress: Vec::new(),
            plugins: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded configuration from {}", path.display());
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise use the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for dir in &self.search_dirs {
            if dir.path.trim().is_empty() {
                return Err(Error::InvalidPath("empty search directory".to_string()));
            }
            if !seen.insert(dir.path.as_str()) {
                return Err(Error::InvalidPath(format!(
                    "search directory {} is listed twice",
                    dir.path
                )));
            }
        }
        Ok(())
    }

    /// Configured search directories for one package, in order
    pub fn search_dirs_for(&self, package: &str) -> Vec<String> {
        self.search_dirs
            .iter()
            .filter(|d| d.applies_to(package))
            .map(|d| d.path.clone())
            .collect()
    }

    pub fn suppressions(&self) -> Suppressions {
        Suppressions::new(self.suppress.iter().cloned())
    }
}
