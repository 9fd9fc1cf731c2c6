// src/package.rs
//! Binary package definitions
//!
//! Packages are declared in a deb822 control file. Only the fields the
//! engine needs are read: `Package`, `Architecture` and `Build-Profiles`.

use crate::condition::{ArchSpec, BuildContext, PackageArch, ProfileFormula};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// A binary package as declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDef {
    pub name: String,
    /// `all`, `any` or an architecture restriction list
    pub architecture: String,
    pub build_profiles: Option<ProfileFormula>,
}

impl PackageDef {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            build_profiles: None,
        }
    }

    pub fn with_build_profiles(mut self, formula: ProfileFormula) -> Self {
        self.build_profiles = Some(formula);
        self
    }

    pub fn is_arch_all(&self) -> bool {
        self.architecture.trim() == "all"
    }
}

/// A package resolved against the build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub arch: PackageArch,
    /// Built (acted on) in this build
    pub built: bool,
    /// Package whose documentation directory docs are installed into
    pub doc_main_package: String,
}

/// All packages of the source, in declaration order
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    packages: Vec<ResolvedPackage>,
    positions: BTreeMap<String, usize>,
}

impl PackageSet {
    /// Resolve declarations against the build
    pub fn resolve(defs: &[PackageDef], build: &BuildContext) -> Result<Self> {
        let mut set = Self::default();
        for def in defs {
            if set.positions.contains_key(&def.name) {
                return Err(Error::InvalidRule {
                    site: "control".to_string(),
                    reason: format!("package {} is declared twice", def.name),
                });
            }
            let (arch, arch_ok) = if def.is_arch_all() {
                (PackageArch::Independent, true)
            } else {
                let spec = ArchSpec::parse(&def.architecture).map_err(|e| e.at(&def.name))?;
                (
                    PackageArch::Concrete(build.host_arch().to_string()),
                    spec.matches(build.host_arch()),
                )
            };
            let profiles_ok = def
                .build_profiles
                .as_ref()
                .is_none_or(|f| f.matches(build.build_profiles()));
            let built = arch_ok && profiles_ok;
            if !built {
                info!("Package {} is not built for this build", def.name);
            }
            set.positions.insert(def.name.clone(), set.packages.len());
            set.packages.push(ResolvedPackage {
                name: def.name.clone(),
                arch,
                built,
                doc_main_package: def.name.clone(),
            });
        }

        for i in 0..set.packages.len() {
            let name = &set.packages[i].name;
            if let Some(main) = name.strip_suffix("-doc") {
                if set.positions.contains_key(main) {
                    debug!("Documentation of {} goes to {}", name, main);
                    set.packages[i].doc_main_package = main.to_string();
                }
            }
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.positions.get(name).map(|&i| &self.packages[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn is_built(&self, name: &str) -> bool {
        self.get(name).is_some_and(|p| p.built)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Parse the binary package stanzas of a control file
pub fn parse_control(content: &str) -> Result<Vec<PackageDef>> {
    let mut defs = Vec::new();
    for (index, stanza) in deb822_stanzas(content).into_iter().enumerate() {
        let Some(name) = stanza.get("package") else {
            // Source stanza
            continue;
        };
        let site = format!("control stanza {}", index + 1);
        let architecture = stanza
            .get("architecture")
            .cloned()
            .ok_or_else(|| Error::invalid_rule(&site, format!("package {name} has no Architecture")))?;
        let mut def = PackageDef::new(name.clone(), architecture);
        if let Some(profiles) = stanza.get("build-profiles") {
            def.build_profiles =
                Some(ProfileFormula::parse(profiles).map_err(|e| e.at(&site))?);
        }
        defs.push(def);
    }
    Ok(defs)
}

/// Load package definitions from a control file
pub fn load_control(path: &Path) -> Result<Vec<PackageDef>> {
    let content = std::fs::read_to_string(path)?;
    let defs = parse_control(&content)?;
    info!("Loaded {} package(s) from {}", defs.len(), path.display());
    Ok(defs)
}

/// Split deb822 text into stanzas of lower-cased field names
fn deb822_stanzas(content: &str) -> Vec<BTreeMap<String, String>> {
    let mut stanzas = Vec::new();
    let mut current: BTreeMap<String, String> = BTreeMap::new();
    let mut last_field: Option<String> = None;

    for line in content.lines() {
        if line.starts_with('#') {
            continue;
        }
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
            last_field = None;
            continue;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(field) = &last_field {
                if let Some(value) = current.get_mut(field) {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            }
            continue;
        }
        if let Some((field, value)) = line.split_once(':') {
            let field = field.trim().to_ascii_lowercase();
            current.insert(field.clone(), value.trim().to_string());
            last_field = Some(field);
        }
    }
    if !current.is_empty() {
        stanzas.push(current);
    }
    stanzas
}
