// src/manifest/raw.rs
//! Manifest document as written, before substitution and validation
//!
//! Rule lists are kept as raw YAML values so each entry can be decoded with
//! its own declaration site attached to any error.

use crate::service::{ServiceScope, UpgradeRule};
use crate::transform::{DeleteOn, ReplacementRule};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawManifest {
    pub manifest_version: String,
    #[serde(default)]
    pub definitions: RawDefinitions,
    #[serde(default)]
    pub installations: Vec<Value>,
    #[serde(default)]
    pub packages: BTreeMap<String, RawPackage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawDefinitions {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawPackage {
    #[serde(default)]
    pub transformations: Vec<Value>,
    #[serde(default)]
    pub services: Vec<Value>,
    #[serde(default)]
    pub clean_after_removal: Vec<Value>,
    /// Overrides the configured search directories for this package
    pub installation_search_dirs: Option<Vec<String>>,
}

/// A string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// A scalar that may be written as a number (`section: 8`, `owner: 0`)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(u64),
    Text(String),
}

impl Scalar {
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawInstall {
    pub source: Option<String>,
    pub sources: Option<Vec<String>>,
    pub dest_dir: Option<String>,
    #[serde(rename = "as")]
    pub install_as: Option<String>,
    pub into: Option<OneOrMany>,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawMultiDestInstall {
    pub source: Option<String>,
    pub sources: Option<Vec<String>>,
    pub dest_dirs: Option<Vec<String>>,
    #[serde(rename = "as")]
    pub install_as: Option<Vec<String>>,
    pub into: Option<OneOrMany>,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawInstallMan {
    pub source: Option<String>,
    pub sources: Option<Vec<String>>,
    pub section: Option<Scalar>,
    pub language: Option<String>,
    pub into: Option<OneOrMany>,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawDiscard {
    pub path: Option<String>,
    pub paths: Option<Vec<String>>,
    pub search_dirs: Option<Vec<String>>,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawRemove {
    pub path: Option<String>,
    pub paths: Option<Vec<String>>,
    #[serde(default)]
    pub keep_empty_parent_dirs: bool,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawMove {
    pub source: String,
    pub target: String,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawCreateSymlink {
    pub path: String,
    pub target: String,
    #[serde(default)]
    pub replacement_rule: ReplacementRule,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawCreateDirectories {
    pub path: Option<String>,
    pub paths: Option<Vec<String>>,
    pub owner: Option<Scalar>,
    pub group: Option<Scalar>,
    pub mode: Option<Scalar>,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawPathMetadata {
    pub path: Option<String>,
    pub paths: Option<Vec<String>>,
    pub owner: Option<Scalar>,
    pub group: Option<Scalar>,
    pub mode: Option<Scalar>,
    pub capabilities: Option<String>,
    pub capability_mode: Option<Scalar>,
    #[serde(default)]
    pub recursive: bool,
    pub when: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawCleanAfterRemoval {
    pub path: Option<String>,
    pub paths: Option<Vec<String>>,
    #[serde(default)]
    pub delete_on: DeleteOn,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub ignore_non_empty_dir: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawService {
    pub service: String,
    pub type_of_service: Option<String>,
    pub service_scope: Option<ServiceScope>,
    pub enable_on_install: Option<bool>,
    pub start_on_install: Option<bool>,
    pub on_upgrade: Option<UpgradeRule>,
    pub service_managers: Option<Vec<String>>,
    pub when: Option<Value>,
}
