// src/service/systemd.rs
//! systemd unit detection

use super::{DetectedService, ServiceDetector, ServiceScope, UpgradeRule, read_content};
use crate::error::{Error, Result};
use crate::filesystem::PackageTree;
use std::collections::{BTreeMap, BTreeSet};

const UNIT_DIRS: &[&str] = &["usr/lib/systemd/system", "lib/systemd/system"];

/// Finds system units below the systemd unit directories
///
/// Symlinks in the unit directories and `Alias=` lines name aliases.
/// Templated units (`foo@.service`) are skipped. Every unit is started by
/// default; only units with an `[Install]` section are enabled.
pub struct SystemdDetector;

struct UnitFile {
    name: String,
    path: String,
    has_install: bool,
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && matches!(bytes[0], b'"' | b'\'') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

impl ServiceDetector for SystemdDetector {
    fn manager(&self) -> &str {
        "systemd"
    }

    fn description(&self) -> &str {
        "systemd system units in usr/lib/systemd/system and lib/systemd/system"
    }

    fn detect(&self, tree: &PackageTree) -> Result<Vec<DetectedService>> {
        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen = BTreeSet::new();
        let mut units = Vec::new();
        let mut expected: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for dir in UNIT_DIRS {
            let Some(dir_id) = tree.lookup(dir) else {
                continue;
            };
            for &child in tree.get_node(dir_id).children() {
                let node = tree.get_node(child);
                if let Some(target) = node.link_target() {
                    let dest = target.rsplit('/').next().unwrap_or(target);
                    aliases
                        .entry(dest.to_string())
                        .or_default()
                        .push(node.name().to_string());
                    continue;
                }
                if !node.is_file() || !seen.insert(node.name().to_string()) {
                    continue;
                }
                let path = tree.get_path(child);
                if node.name().contains('@') {
                    continue;
                }
                let mut has_install = false;
                for line in read_content(tree, child)?.lines() {
                    let line = line.trim();
                    let lower = line.to_ascii_lowercase();
                    if lower == "[install]" {
                        has_install = true;
                    } else if lower.starts_with("alias=") {
                        aliases
                            .entry(node.name().to_string())
                            .or_default()
                            .extend(line[6..].split_whitespace().map(|a| unquote(a).to_string()));
                    } else if lower.starts_with("also=") {
                        for unit in line[5..].split_whitespace() {
                            expected
                                .entry(unquote(unit).to_string())
                                .or_default()
                                .push(path.clone());
                        }
                    }
                }
                units.push(UnitFile {
                    name: node.name().to_string(),
                    path,
                    has_install,
                });
            }
        }

        let mut services = Vec::with_capacity(units.len());
        for unit in units {
            let unit_aliases = aliases.remove(&unit.name).unwrap_or_default();
            expected.remove(&unit.name);
            for alias in &unit_aliases {
                expected.remove(alias);
            }

            let mut names = vec![unit.name.clone()];
            if let Some(stem) = unit.name.strip_suffix(".service") {
                names.push(stem.to_string());
            }
            let alias_stems: Vec<String> = unit_aliases
                .iter()
                .filter_map(|a| a.strip_suffix(".service").map(str::to_string))
                .collect();
            names.extend(unit_aliases);
            names.extend(alias_stems);

            let type_of_service = unit
                .name
                .rsplit_once('.')
                .map(|(_, suffix)| suffix.to_string())
                .unwrap_or_default();
            services.push(DetectedService {
                path: unit.path,
                names,
                type_of_service,
                scope: ServiceScope::System,
                enable_by_default: unit.has_install,
                start_by_default: true,
                default_upgrade: UpgradeRule::Restart,
                cannot_enable: !unit.has_install,
            });
        }

        if let Some((unit, required_by)) = expected.into_iter().next() {
            return Err(Error::NotFound(format!(
                "systemd unit {unit} required by {} (via Also=)",
                required_by.join(", ")
            )));
        }
        Ok(services)
    }
}
