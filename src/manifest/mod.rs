// src/manifest/mod.rs
//! Manifest loading
//!
//! The manifest is a YAML document with an ordered `installations` list and a
//! `packages` section holding each package's transformations, services,
//! clean-after-removal rules and search directory overrides. Loading turns
//! it into typed rules: variables are substituted, conditions parsed and
//! statically validated, and every rule is tagged with its declaration site
//! (`installations[2].install`, `packages.foo.transformations[0].move`).
//!
//! # Example
//!
//! ```yaml
//! manifest-version: "0.1"
//! installations:
//!   - install:
//!       sources: ["usr/bin/foo", "usr/share/man/man1/foo.1"]
//!       into: foo
//!   - discard: "usr/lib/*/libfoo.a"
//! packages:
//!   foo:
//!     transformations:
//!       - create-symlink:
//!           path: usr/bin/bar
//!           target: foo
//! ```

mod conditions;
mod raw;
mod substitution;

pub use conditions::parse_condition;
pub use substitution::Substitution;

use crate::condition::{BuildContext, Condition, PackageArch};
use crate::error::{Error, Result};
use crate::filesystem::{Account, AccountKind, FileMode};
use crate::install::{
    Destination, InstallKind, InstallationRule, ManLanguage, MultiDestination,
};
use crate::matcher::PathPattern;
use crate::package::PackageSet;
use crate::service::{ServiceRule, ServiceScope};
use crate::transform::{CleanSpec, TransformKind, TransformationRule};
use raw::{
    OneOrMany, RawCleanAfterRemoval, RawCreateDirectories, RawCreateSymlink, RawDiscard,
    RawInstall, RawInstallMan, RawManifest, RawMove, RawMultiDestInstall, RawPathMetadata,
    RawRemove, RawService, Scalar,
};
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const SUPPORTED_VERSIONS: &[&str] = &["0.1"];

/// Per-package part of the manifest
#[derive(Debug, Clone, Default)]
pub struct PackageManifest {
    /// Transformations, then clean-after-removal rules, then service rules
    pub transformations: Vec<TransformationRule>,
    pub search_dirs: Option<Vec<String>>,
}

/// A loaded and validated manifest
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub installations: Vec<InstallationRule>,
    pub packages: BTreeMap<String, PackageManifest>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn load(path: &Path, packages: &PackageSet, build: &BuildContext) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded manifest {}", path.display());
        Self::parse(&content, packages, build)
    }

    pub fn parse(content: &str, packages: &PackageSet, build: &BuildContext) -> Result<Self> {
        let raw: RawManifest = serde_yaml::from_str(content)?;
        if !SUPPORTED_VERSIONS.contains(&raw.manifest_version.as_str()) {
            return Err(Error::invalid_rule(
                "manifest-version",
                format!(
                    "unsupported manifest version \"{}\" (supported: {})",
                    raw.manifest_version,
                    SUPPORTED_VERSIONS.join(", ")
                ),
            ));
        }
        let substitution = Substitution::new(build, &raw.definitions.variables)?;

        let mut manifest = Self::default();
        for (i, value) in raw.installations.iter().enumerate() {
            let loader = RuleLoader {
                packages,
                subst: &substitution,
                package: None,
            };
            manifest
                .installations
                .push(loader.installation(value, &format!("installations[{i}]"))?);
        }

        for (name, raw_package) in raw.packages {
            let Some(resolved) = packages.get(&name) else {
                return Err(Error::invalid_rule(
                    format!("packages.{name}"),
                    format!("unknown package \"{name}\""),
                ));
            };
            let subst = substitution.for_package(&name);
            let loader = RuleLoader {
                packages,
                subst: &subst,
                package: Some((name.as_str(), &resolved.arch)),
            };

            let mut transformations = Vec::new();
            for (i, value) in raw_package.transformations.iter().enumerate() {
                transformations.push(
                    loader.transformation(value, &format!("packages.{name}.transformations[{i}]"))?,
                );
            }
            for (i, value) in raw_package.clean_after_removal.iter().enumerate() {
                transformations.push(
                    loader.clean_after_removal(value, &format!("packages.{name}.clean-after-removal[{i}]"))?,
                );
            }
            for (i, value) in raw_package.services.iter().enumerate() {
                transformations.push(loader.service(value, &format!("packages.{name}.services[{i}]"))?);
            }

            let search_dirs = raw_package
                .installation_search_dirs
                .map(|dirs| {
                    dirs.iter()
                        .map(|d| subst.substitute(d, &format!("packages.{name}.installation-search-dirs")))
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?;

            manifest.packages.insert(
                name,
                PackageManifest {
                    transformations,
                    search_dirs,
                },
            );
        }
        Ok(manifest)
    }

    /// Transformations of a package; empty when it has no section
    pub fn transformations(&self, package: &str) -> &[TransformationRule] {
        self.packages
            .get(package)
            .map(|p| p.transformations.as_slice())
            .unwrap_or(&[])
    }

    /// Packages that override the configured search directories
    pub fn requested_search_dirs(&self) -> BTreeMap<String, Vec<String>> {
        self.packages
            .iter()
            .filter_map(|(name, p)| p.search_dirs.clone().map(|dirs| (name.clone(), dirs)))
            .collect()
    }
}

/// Split a `{kind: body}` rule entry
fn single_key<'v>(value: &'v Value, site: &str) -> Result<(&'v str, &'v Value)> {
    if let Value::Mapping(map) = value {
        let mut entries = map.iter();
        if let (Some((Value::String(key), body)), None) = (entries.next(), entries.next()) {
            return Ok((key.as_str(), body));
        }
    }
    Err(Error::invalid_rule(
        site,
        "each rule must be a mapping with exactly one key naming the rule",
    ))
}

fn decode<T: DeserializeOwned>(value: &Value, site: &str) -> Result<T> {
    serde_yaml::from_value(value.clone()).map_err(|e| Error::invalid_rule(site, e.to_string()))
}

/// Either `path` or `paths` (or `source`/`sources`), never both
fn one_or_many(
    one: Option<String>,
    many: Option<Vec<String>>,
    names: (&str, &str),
    site: &str,
) -> Result<Vec<String>> {
    match (one, many) {
        (Some(one), None) => Ok(vec![one]),
        (None, Some(many)) if !many.is_empty() => Ok(many),
        (Some(_), Some(_)) => Err(Error::invalid_rule(
            site,
            format!("\"{}\" and \"{}\" are mutually exclusive", names.0, names.1),
        )),
        _ => Err(Error::invalid_rule(
            site,
            format!("one of \"{}\" or \"{}\" is required", names.0, names.1),
        )),
    }
}

/// A bare string or list is shorthand for the rule's path list
fn is_shorthand(body: &Value) -> bool {
    matches!(body, Value::String(_) | Value::Sequence(_))
}

fn shorthand_paths(body: &Value, site: &str) -> Result<Vec<String>> {
    Ok(decode::<OneOrMany>(body, site)?.into_vec())
}

struct RuleLoader<'a> {
    packages: &'a PackageSet,
    subst: &'a Substitution,
    /// Set for rules in a package section
    package: Option<(&'a str, &'a PackageArch)>,
}

impl RuleLoader<'_> {
    fn condition(&self, when: Option<&Value>, site: &str) -> Result<Option<Condition>> {
        let Some(when) = when else {
            return Ok(None);
        };
        let site = format!("{site}.when");
        let condition = parse_condition(when, &site)?;
        condition.validate(self.package).map_err(|e| e.at(&site))?;
        Ok(Some(condition))
    }

    fn patterns(&self, raw: &[String], site: &str) -> Result<Vec<PathPattern>> {
        raw.iter()
            .map(|p| self.subst.pattern(p, site))
            .collect()
    }

    fn literal(&self, text: &str, site: &str) -> Result<String> {
        self.subst.substitute(text, site)
    }

    fn single_into(&self, into: Option<OneOrMany>, site: &str) -> Result<String> {
        let mut names = self.into_list(into, site)?;
        if names.len() != 1 {
            return Err(Error::invalid_rule(
                site,
                "\"into\" must name exactly one package; use multi-dest-install for several",
            ));
        }
        Ok(names.remove(0))
    }

    fn into_list(&self, into: Option<OneOrMany>, site: &str) -> Result<Vec<String>> {
        match into {
            Some(into) => into
                .into_vec()
                .iter()
                .map(|name| self.literal(name, site))
                .collect(),
            None if self.packages.len() == 1 => Ok(self.packages.names()),
            None => Err(Error::invalid_rule(
                site,
                "\"into\" is required when there is more than one package",
            )),
        }
    }

    fn account(&self, value: Option<Scalar>, kind: AccountKind, site: &str) -> Result<Option<Account>> {
        value
            .map(|v| Account::parse(&v.into_string(), kind).map_err(|e| Error::invalid_rule(site, e)))
            .transpose()
    }

    fn mode(&self, value: Option<Scalar>, site: &str) -> Result<Option<FileMode>> {
        value
            .map(|v| FileMode::parse(&v.into_string()).map_err(|e| Error::invalid_rule(site, e)))
            .transpose()
    }

    fn installation(&self, value: &Value, base: &str) -> Result<InstallationRule> {
        let (key, body) = single_key(value, base)?;
        let site = format!("{base}.{key}");

        let (kind, when) = match key {
            "install" | "install-docs" | "install-examples" => {
                let raw: RawInstall = if is_shorthand(body) {
                    RawInstall {
                        sources: Some(shorthand_paths(body, &site)?),
                        ..Default::default()
                    }
                } else {
                    decode(body, &site)?
                };
                let sources = self.patterns(
                    &one_or_many(raw.source, raw.sources, ("source", "sources"), &site)?,
                    &site,
                )?;
                let dest = match (raw.dest_dir, raw.install_as) {
                    (Some(_), Some(_)) => {
                        return Err(Error::invalid_rule(
                            &site,
                            "\"dest-dir\" and \"as\" are mutually exclusive",
                        ));
                    }
                    (Some(dir), None) => Destination::DestDir(self.literal(&dir, &site)?),
                    (None, Some(path)) => Destination::As(self.literal(&path, &site)?),
                    (None, None) => Destination::Default,
                };
                let into = self.single_into(raw.into, &site)?;
                let kind = match key {
                    "install" => InstallKind::Install { sources, dest, into },
                    "install-docs" => InstallKind::InstallDocs { sources, dest, into },
                    _ => {
                        if dest != Destination::Default {
                            return Err(Error::invalid_rule(
                                &site,
                                "install-examples does not accept \"dest-dir\" or \"as\"",
                            ));
                        }
                        InstallKind::InstallExamples { sources, into }
                    }
                };
                (kind, raw.when)
            }
            "multi-dest-install" => {
                let raw: RawMultiDestInstall = decode(body, &site)?;
                let sources = self.patterns(
                    &one_or_many(raw.source, raw.sources, ("source", "sources"), &site)?,
                    &site,
                )?;
                let literals = |values: Vec<String>| {
                    values
                        .iter()
                        .map(|v| self.literal(v, &site))
                        .collect::<Result<Vec<_>>>()
                };
                let dest = match (raw.dest_dirs, raw.install_as) {
                    (Some(dirs), None) => MultiDestination::DestDirs(literals(dirs)?),
                    (None, Some(paths)) => MultiDestination::As(literals(paths)?),
                    _ => {
                        return Err(Error::invalid_rule(
                            &site,
                            "exactly one of \"dest-dirs\" or \"as\" is required",
                        ));
                    }
                };
                let into = self.into_list(raw.into, &site)?;
                (InstallKind::MultiDestInstall { sources, dest, into }, raw.when)
            }
            "install-man" => {
                let raw: RawInstallMan = if is_shorthand(body) {
                    RawInstallMan {
                        sources: Some(shorthand_paths(body, &site)?),
                        ..Default::default()
                    }
                } else {
                    decode(body, &site)?
                };
                let sources = self.patterns(
                    &one_or_many(raw.source, raw.sources, ("source", "sources"), &site)?,
                    &site,
                )?;
                let kind = InstallKind::InstallMan {
                    sources,
                    section: raw.section.map(Scalar::into_string),
                    language: raw.language.as_deref().map(ManLanguage::parse),
                    into: self.single_into(raw.into, &site)?,
                };
                (kind, raw.when)
            }
            "discard" => {
                let raw: RawDiscard = if is_shorthand(body) {
                    RawDiscard {
                        paths: Some(shorthand_paths(body, &site)?),
                        ..Default::default()
                    }
                } else {
                    decode(body, &site)?
                };
                let patterns =
                    self.patterns(&one_or_many(raw.path, raw.paths, ("path", "paths"), &site)?, &site)?;
                (
                    InstallKind::Discard {
                        patterns,
                        search_dirs: raw.search_dirs,
                    },
                    raw.when,
                )
            }
            other => {
                return Err(Error::invalid_rule(
                    base,
                    format!("unknown installation rule \"{other}\""),
                ));
            }
        };

        let condition = self.condition(when.as_ref(), &site)?;
        Ok(InstallationRule {
            site,
            condition,
            kind,
        })
    }

    fn transformation(&self, value: &Value, base: &str) -> Result<TransformationRule> {
        let (key, body) = single_key(value, base)?;
        let site = format!("{base}.{key}");

        let (kind, when) = match key {
            "remove" => {
                let raw: RawRemove = if is_shorthand(body) {
                    RawRemove {
                        paths: Some(shorthand_paths(body, &site)?),
                        ..Default::default()
                    }
                } else {
                    decode(body, &site)?
                };
                let paths =
                    self.patterns(&one_or_many(raw.path, raw.paths, ("path", "paths"), &site)?, &site)?;
                (
                    TransformKind::Remove {
                        paths,
                        keep_empty_parent_dirs: raw.keep_empty_parent_dirs,
                    },
                    raw.when,
                )
            }
            "move" => {
                let raw: RawMove = decode(body, &site)?;
                let source = self.subst.pattern(&raw.source, &site)?;
                (
                    TransformKind::Move {
                        source,
                        target: self.literal(&raw.target, &site)?,
                    },
                    raw.when,
                )
            }
            "create-symlink" => {
                let raw: RawCreateSymlink = decode(body, &site)?;
                (
                    TransformKind::CreateSymlink {
                        path: self.literal(&raw.path, &site)?,
                        target: self.literal(&raw.target, &site)?,
                        replacement: raw.replacement_rule,
                    },
                    raw.when,
                )
            }
            "create-directories" => {
                let raw: RawCreateDirectories = if is_shorthand(body) {
                    RawCreateDirectories {
                        paths: Some(shorthand_paths(body, &site)?),
                        ..Default::default()
                    }
                } else {
                    decode(body, &site)?
                };
                let paths = one_or_many(raw.path, raw.paths, ("path", "paths"), &site)?
                    .iter()
                    .map(|p| self.literal(p, &site))
                    .collect::<Result<Vec<_>>>()?;
                (
                    TransformKind::CreateDirectories {
                        paths,
                        owner: self.account(raw.owner, AccountKind::User, &site)?,
                        group: self.account(raw.group, AccountKind::Group, &site)?,
                        mode: self.mode(raw.mode, &site)?,
                    },
                    raw.when,
                )
            }
            "path-metadata" => {
                let raw: RawPathMetadata = decode(body, &site)?;
                let paths =
                    self.patterns(&one_or_many(raw.path, raw.paths, ("path", "paths"), &site)?, &site)?;
                let owner = self.account(raw.owner, AccountKind::User, &site)?;
                let group = self.account(raw.group, AccountKind::Group, &site)?;
                let mode = self.mode(raw.mode, &site)?;
                let capability_mode = match (&raw.capabilities, raw.capability_mode) {
                    (Some(_), Some(cap_mode)) => self.mode(Some(cap_mode), &site)?,
                    (Some(_), None) => Some(FileMode::parse("a-s").map_err(|e| Error::invalid_rule(&site, e))?),
                    (None, Some(_)) => {
                        return Err(Error::invalid_rule(
                            &site,
                            "\"capability-mode\" requires \"capabilities\"",
                        ));
                    }
                    (None, None) => None,
                };
                if owner.is_none() && group.is_none() && mode.is_none() && raw.capabilities.is_none() {
                    return Err(Error::invalid_rule(
                        &site,
                        "at least one of \"owner\", \"group\", \"mode\" or \"capabilities\" is required",
                    ));
                }
                (
                    TransformKind::PathMetadata {
                        paths,
                        owner,
                        group,
                        mode,
                        capabilities: raw.capabilities,
                        capability_mode,
                        recursive: raw.recursive,
                    },
                    raw.when,
                )
            }
            other => {
                return Err(Error::invalid_rule(
                    base,
                    format!("unknown transformation \"{other}\""),
                ));
            }
        };

        let condition = self.condition(when.as_ref(), &site)?;
        Ok(TransformationRule {
            site,
            condition,
            kind,
        })
    }

    fn clean_after_removal(&self, value: &Value, site: &str) -> Result<TransformationRule> {
        let raw: RawCleanAfterRemoval = if is_shorthand(value) {
            RawCleanAfterRemoval {
                paths: Some(shorthand_paths(value, site)?),
                ..Default::default()
            }
        } else {
            decode(value, site)?
        };
        let paths = one_or_many(raw.path, raw.paths, ("path", "paths"), site)?
            .iter()
            .map(|p| self.subst.substitute_pattern(p, site))
            .collect::<Result<Vec<_>>>()?;
        let spec = CleanSpec::new(
            site,
            paths,
            raw.delete_on,
            raw.recursive,
            raw.ignore_non_empty_dir,
        )?;
        Ok(TransformationRule::new(site, TransformKind::CleanAfterRemoval(spec)))
    }

    fn service(&self, value: &Value, site: &str) -> Result<TransformationRule> {
        let raw: RawService = if let Value::String(name) = value {
            RawService {
                service: name.clone(),
                type_of_service: None,
                service_scope: None,
                enable_on_install: None,
                start_on_install: None,
                on_upgrade: None,
                service_managers: None,
                when: None,
            }
        } else {
            decode(value, site)?
        };

        let mut rule = ServiceRule::new(site, self.literal(&raw.service, site)?);
        if let Some(type_of_service) = raw.type_of_service {
            rule.type_of_service = type_of_service;
        }
        rule.scope = raw.service_scope.unwrap_or(ServiceScope::System);
        rule.enable_on_install = raw.enable_on_install;
        rule.start_on_install = raw.start_on_install;
        rule.on_upgrade = raw.on_upgrade;
        rule.service_managers = raw.service_managers.map(|m| m.into_iter().collect());
        rule.condition = self.condition(raw.when.as_ref(), site)?;
        Ok(TransformationRule::new(site, TransformKind::Service(rule)))
    }
}
