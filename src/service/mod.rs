// src/service/mod.rs
//! Service lifecycle metadata
//!
//! Service managers are pluggable detectors that inspect a package's final
//! tree and report the services it ships. Package-level service rules then
//! adjust the defaults (enable, start, upgrade action) of the detected
//! services they name. A rule names a service by any of its names or
//! aliases; resolution follows the alias graph within each manager.

mod systemd;
mod sysv;

pub use systemd::SystemdDetector;
pub use sysv::SysvInitDetector;

use crate::condition::{Condition, ConditionContext};
use crate::error::{Error, Result};
use crate::filesystem::{NodeId, PackageTree};
use crate::usage::{RuleId, RuleKind, UsageTracker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::debug;

/// Whether a service runs system-wide or per user
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceScope {
    System,
    User,
}

/// Action taken on a running service when the package is upgraded
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UpgradeRule {
    DoNothing,
    Reload,
    Restart,
    StopThenStart,
}

/// A service found in a package tree by a detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedService {
    /// Path of the unit file or init script
    pub path: String,
    /// Primary name first, then every alias
    pub names: Vec<String>,
    pub type_of_service: String,
    pub scope: ServiceScope,
    pub enable_by_default: bool,
    pub start_by_default: bool,
    pub default_upgrade: UpgradeRule,
    /// The manager refuses to enable this service
    pub cannot_enable: bool,
}

impl DetectedService {
    pub fn name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// Executable capability that finds services in a package tree
pub trait ServiceDetector: Send + Sync {
    /// Manager name as used in `service-managers`
    fn manager(&self) -> &str;

    fn description(&self) -> &str;

    fn detect(&self, tree: &PackageTree) -> Result<Vec<DetectedService>>;
}

/// Read a file's content through its provenance
pub(crate) fn read_content(tree: &PackageTree, id: NodeId) -> Result<String> {
    let node = tree.get_node(id);
    match node.source() {
        Some(source) => Ok(std::fs::read_to_string(&source.fs_path)?),
        None => Ok(String::new()),
    }
}

/// A `services` entry of a package
#[derive(Debug, Clone)]
pub struct ServiceRule {
    pub site: String,
    pub service: String,
    pub type_of_service: String,
    pub scope: ServiceScope,
    pub enable_on_install: Option<bool>,
    pub start_on_install: Option<bool>,
    pub on_upgrade: Option<UpgradeRule>,
    /// Restrict the rule to these managers
    pub service_managers: Option<BTreeSet<String>>,
    pub condition: Option<Condition>,
}

impl ServiceRule {
    pub fn new(site: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            service: service.into(),
            type_of_service: "service".to_string(),
            scope: ServiceScope::System,
            enable_on_install: None,
            start_on_install: None,
            on_upgrade: None,
            service_managers: None,
            condition: None,
        }
    }

    pub fn id(&self) -> RuleId {
        RuleId::new(RuleKind::Service, &self.site)
    }

    fn applies_to_manager(&self, manager: &str) -> bool {
        self.service_managers
            .as_ref()
            .is_none_or(|managers| managers.contains(manager))
    }
}

/// Final lifecycle metadata of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceRecord {
    pub manager: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub path: String,
    pub type_of_service: String,
    pub service_scope: ServiceScope,
    pub enable_on_install: bool,
    pub start_on_install: bool,
    pub on_upgrade: UpgradeRule,
    /// Site of the manifest rule that adjusted the defaults, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {}): enable={} start={} upgrade={}",
            self.manager,
            self.name,
            self.type_of_service,
            self.service_scope,
            self.enable_on_install,
            self.start_on_install,
            self.on_upgrade
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ServiceKey {
    name: String,
    type_of_service: String,
    scope: ServiceScope,
    manager: String,
}

/// Detect the services of a package and apply its service rules
pub fn resolve_services(
    package: &str,
    tree: &PackageTree,
    detectors: &[Box<dyn ServiceDetector>],
    rules: &[ServiceRule],
    ctx: &ConditionContext<'_>,
    usage: &mut UsageTracker,
) -> Result<Vec<ServiceRecord>> {
    for rule in rules {
        for manager in rule.service_managers.iter().flatten() {
            if !detectors.iter().any(|d| d.manager() == manager) {
                return Err(Error::invalid_rule(
                    &rule.site,
                    format!("unknown service manager \"{manager}\""),
                ));
            }
        }
    }

    let mut records: BTreeMap<ServiceKey, ServiceRecord> = BTreeMap::new();
    let mut by_name: BTreeMap<String, Vec<ServiceKey>> = BTreeMap::new();
    let mut cannot_enable = BTreeSet::new();

    for detector in detectors {
        for service in detector.detect(tree)? {
            let Some((primary, aliases)) = service.names.split_first() else {
                return Err(Error::ServiceResolution {
                    service: service.path.clone(),
                    package: package.to_string(),
                    reason: format!("the {} detector reported it without a name", detector.manager()),
                    site: service.path.clone(),
                });
            };
            let key = ServiceKey {
                name: primary.clone(),
                type_of_service: service.type_of_service.clone(),
                scope: service.scope,
                manager: detector.manager().to_string(),
            };
            if let Some(existing) = records.get(&key) {
                return Err(Error::ServiceResolution {
                    service: key.name.clone(),
                    package: package.to_string(),
                    reason: format!(
                        "{} detected it twice, at {} and {}",
                        key.manager, existing.path, service.path
                    ),
                    site: service.path.clone(),
                });
            }
            debug!("{}: detected {} service {}", package, key.manager, key.name);
            for name in &service.names {
                by_name.entry(name.clone()).or_default().push(key.clone());
            }
            if service.cannot_enable {
                cannot_enable.insert(key.clone());
            }
            records.insert(
                key.clone(),
                ServiceRecord {
                    manager: key.manager.clone(),
                    name: key.name.clone(),
                    aliases: aliases.to_vec(),
                    path: service.path.clone(),
                    type_of_service: service.type_of_service.clone(),
                    service_scope: service.scope,
                    enable_on_install: service.enable_by_default,
                    start_on_install: service.start_by_default,
                    on_upgrade: service.default_upgrade,
                    definition: None,
                },
            );
        }
    }

    for rule in rules {
        let id = rule.id();
        usage.declare(&id);
        if let Some(condition) = &rule.condition {
            if !condition.evaluate(ctx).map_err(|e| e.at(&rule.site))? {
                usage.skip_condition_false(&id);
                continue;
            }
        }

        let keys = relevant_keys(rule, &records, &by_name);
        if keys.is_empty() {
            let managers = match &rule.service_managers {
                Some(managers) => managers.iter().cloned().collect::<Vec<_>>(),
                None => detectors.iter().map(|d| d.manager().to_string()).collect(),
            };
            return Err(Error::ServiceResolution {
                service: rule.service.clone(),
                package: package.to_string(),
                reason: format!(
                    "none of the service managers ({}) detected a service of that name (type: {}, scope: {})",
                    managers.join(", "),
                    rule.type_of_service,
                    rule.scope
                ),
                site: rule.site.clone(),
            });
        }

        if let Some(explicit) = &rule.service_managers {
            let seen: BTreeSet<&str> = keys.iter().map(|k| k.manager.as_str()).collect();
            let missing: Vec<&str> = explicit
                .iter()
                .map(String::as_str)
                .filter(|m| !seen.contains(m))
                .collect();
            if !missing.is_empty() {
                return Err(Error::ServiceResolution {
                    service: rule.service.clone(),
                    package: package.to_string(),
                    reason: format!(
                        "the explicitly requested service managers {} provide no service of that name, type and scope",
                        missing.join(", ")
                    ),
                    site: rule.site.clone(),
                });
            }
        }

        for key in &keys {
            let Some(record) = records.get_mut(key) else {
                continue;
            };
            if let Some(previous) = &record.definition {
                return Err(Error::ServiceResolution {
                    service: rule.service.clone(),
                    package: package.to_string(),
                    reason: format!(
                        "conflicting definitions for {} service {}; the first is at {previous}. Restrict the rules with \"service-managers\" if they are for different managers",
                        key.manager, key.name
                    ),
                    site: rule.site.clone(),
                });
            }
            if rule.service != record.name && record.aliases.contains(&rule.service) {
                let old = std::mem::replace(&mut record.name, rule.service.clone());
                record.aliases.retain(|a| a != &rule.service);
                record.aliases.insert(0, old);
            }
            if let Some(enable) = rule.enable_on_install {
                if enable && cannot_enable.contains(key) {
                    return Err(Error::ServiceResolution {
                        service: rule.service.clone(),
                        package: package.to_string(),
                        reason: format!(
                            "{} cannot enable {} because it has no [Install] section",
                            key.manager, record.path
                        ),
                        site: rule.site.clone(),
                    });
                }
                record.enable_on_install = enable;
            }
            if let Some(start) = rule.start_on_install {
                record.start_on_install = start;
            }
            if let Some(upgrade) = rule.on_upgrade {
                record.on_upgrade = upgrade;
            }
            record.definition = Some(rule.site.clone());
        }
        usage.record(&id, keys.len());
    }

    Ok(records.into_values().collect())
}

/// Breadth-first walk over the alias graph, restricted to the rule's managers
fn relevant_keys(
    rule: &ServiceRule,
    records: &BTreeMap<ServiceKey, ServiceRecord>,
    by_name: &BTreeMap<String, Vec<ServiceKey>>,
) -> Vec<ServiceKey> {
    let wanted = |key: &ServiceKey| {
        key.type_of_service == rule.type_of_service
            && key.scope == rule.scope
            && rule.applies_to_manager(&key.manager)
    };
    let mut queue: VecDeque<ServiceKey> = by_name
        .get(&rule.service)
        .into_iter()
        .flatten()
        .filter(|k| wanted(k))
        .cloned()
        .collect();
    let mut seen = BTreeSet::new();

    while let Some(key) = queue.pop_front() {
        if !seen.insert(key.clone()) {
            continue;
        }
        let Some(record) = records.get(&key) else {
            continue;
        };
        let names = std::iter::once(&record.name).chain(record.aliases.iter());
        for name in names {
            for next in by_name.get(name).into_iter().flatten() {
                if !seen.contains(next) && wanted(next) {
                    queue.push_back(next.clone());
                }
            }
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::BuildContext;
    use crate::filesystem::{NodeMeta, Provenance};
    use std::path::Path;
    use tempfile::TempDir;

    fn add(tree: &mut PackageTree, dir: &Path, path: &str, content: &str, mode: u32) {
        let fs_path = dir.join(path.replace('/', "_"));
        std::fs::write(&fs_path, content).unwrap();
        tree.add_file(
            path,
            NodeMeta::root_owned(mode),
            Some(Provenance {
                search_dir: "debian/tmp".to_string(),
                path: path.to_string(),
                fs_path,
            }),
        )
        .unwrap();
    }

    fn detectors() -> Vec<Box<dyn ServiceDetector>> {
        vec![Box::new(SystemdDetector), Box::new(SysvInitDetector)]
    }

    fn sample_tree(dir: &Path) -> PackageTree {
        let mut tree = PackageTree::new();
        add(
            &mut tree,
            dir,
            "usr/lib/systemd/system/foo.service",
            "[Unit]\nDescription=Foo\n\n[Install]\nWantedBy=multi-user.target\nAlias=foo-alias.service\n",
            0o644,
        );
        add(&mut tree, dir, "etc/init.d/foo", "#!/bin/sh\n", 0o755);
        tree
    }

    fn resolve(tree: &PackageTree, rules: &[ServiceRule]) -> Result<Vec<ServiceRecord>> {
        let build = BuildContext::new("amd64");
        let ctx = ConditionContext::source(&build);
        let mut usage = UsageTracker::new();
        resolve_services("foo", tree, &detectors(), rules, &ctx, &mut usage)
    }

    #[test]
    fn test_defaults_without_rules() {
        let dir = TempDir::new().unwrap();
        let tree = sample_tree(dir.path());
        let records = resolve(&tree, &[]).unwrap();
        assert_eq!(records.len(), 2);

        let systemd = records.iter().find(|r| r.manager == "systemd").unwrap();
        assert_eq!(systemd.name, "foo.service");
        assert_eq!(systemd.aliases, vec!["foo", "foo-alias.service", "foo-alias"]);
        assert!(systemd.enable_on_install);
        assert_eq!(systemd.on_upgrade, UpgradeRule::Restart);

        let sysv = records.iter().find(|r| r.manager == "sysvinit").unwrap();
        assert_eq!(sysv.name, "foo");
        assert_eq!(sysv.path, "etc/init.d/foo");
    }

    #[test]
    fn test_rule_applies_across_managers() {
        let dir = TempDir::new().unwrap();
        let tree = sample_tree(dir.path());
        let mut rule = ServiceRule::new("packages.foo.services[0]", "foo");
        rule.start_on_install = Some(false);
        rule.on_upgrade = Some(UpgradeRule::Reload);
        let records = resolve(&tree, &[rule]).unwrap();
        assert!(records.iter().all(|r| !r.start_on_install));
        assert!(records.iter().all(|r| r.on_upgrade == UpgradeRule::Reload));
        let systemd = records.iter().find(|r| r.manager == "systemd").unwrap();
        assert_eq!(systemd.name, "foo");
        assert_eq!(systemd.definition.as_deref(), Some("packages.foo.services[0]"));
    }

    #[test]
    fn test_alias_lookup() {
        let dir = TempDir::new().unwrap();
        let tree = sample_tree(dir.path());
        let mut rule = ServiceRule::new("s", "foo-alias");
        rule.enable_on_install = Some(false);
        let records = resolve(&tree, &[rule]).unwrap();
        // The systemd alias "foo" links to the sysvinit script as well
        assert!(records.iter().all(|r| !r.enable_on_install));
        assert!(records.iter().all(|r| r.definition.as_deref() == Some("s")));
    }

    #[test]
    fn test_resolution_errors() {
        let dir = TempDir::new().unwrap();
        let tree = sample_tree(dir.path());

        let err = resolve(&tree, &[ServiceRule::new("s", "bar")]).unwrap_err();
        assert_eq!(err.code(), "service-resolution");

        let mut only_systemd = PackageTree::new();
        add(&mut only_systemd, dir.path(), "lib/systemd/system/bar.service", "[Unit]\n", 0o644);
        let mut rule = ServiceRule::new("s", "bar");
        rule.service_managers = Some(["systemd", "sysvinit"].map(String::from).into());
        let err = resolve(&only_systemd, &[rule]).unwrap_err();
        assert!(err.to_string().contains("managers sysvinit"), "{err}");

        let mut rule = ServiceRule::new("s", "bar");
        rule.enable_on_install = Some(true);
        let err = resolve(&only_systemd, &[rule]).unwrap_err();
        assert!(err.to_string().contains("[Install]"), "{err}");

        let mut rule = ServiceRule::new("s", "foo");
        rule.service_managers = Some(["upstart".to_string()].into());
        assert_eq!(resolve(&tree, &[rule]).unwrap_err().code(), "invalid-rule");

        let first = ServiceRule::new("a", "foo");
        let second = ServiceRule::new("b", "foo.service");
        let err = resolve(&tree, &[first, second]).unwrap_err();
        assert!(err.to_string().contains("conflicting"), "{err}");
    }

    /// Reports whatever it was constructed with
    struct FixedDetector(Vec<DetectedService>);

    impl ServiceDetector for FixedDetector {
        fn manager(&self) -> &str {
            "fixed"
        }

        fn description(&self) -> &str {
            "fixed list"
        }

        fn detect(&self, _tree: &PackageTree) -> Result<Vec<DetectedService>> {
            Ok(self.0.clone())
        }
    }

    fn detected(path: &str, names: &[&str]) -> DetectedService {
        DetectedService {
            path: path.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            type_of_service: "service".to_string(),
            scope: ServiceScope::System,
            enable_by_default: true,
            start_by_default: true,
            default_upgrade: UpgradeRule::Restart,
            cannot_enable: false,
        }
    }

    fn resolve_with(detector: FixedDetector) -> Result<Vec<ServiceRecord>> {
        let build = BuildContext::new("amd64");
        let ctx = ConditionContext::source(&build);
        let mut usage = UsageTracker::new();
        let detectors: Vec<Box<dyn ServiceDetector>> = vec![Box::new(detector)];
        resolve_services("foo", &PackageTree::new(), &detectors, &[], &ctx, &mut usage)
    }

    #[test]
    fn test_detector_output_is_checked() {
        let err = resolve_with(FixedDetector(vec![detected("etc/foo", &[])])).unwrap_err();
        assert_eq!(err.code(), "service-resolution");
        assert!(err.to_string().contains("without a name"), "{err}");

        let twice = FixedDetector(vec![
            detected("lib/foo", &["foo"]),
            detected("usr/lib/foo", &["foo", "foo-alias"]),
        ]);
        let err = resolve_with(twice).unwrap_err();
        assert!(err.to_string().contains("at lib/foo and usr/lib/foo"), "{err}");

        let records = resolve_with(FixedDetector(vec![detected("etc/foo", &["foo", "bar"])])).unwrap();
        assert_eq!(records[0].name, "foo");
        assert_eq!(records[0].aliases, vec!["bar"]);
    }

    #[test]
    fn test_unit_in_both_unit_dirs_is_detected_once() {
        let dir = TempDir::new().unwrap();
        let mut tree = PackageTree::new();
        add(&mut tree, dir.path(), "lib/systemd/system/foo.service", "[Unit]\n", 0o644);
        add(
            &mut tree,
            dir.path(),
            "usr/lib/systemd/system/foo.service",
            "[Unit]\n\n[Install]\nWantedBy=multi-user.target\n",
            0o644,
        );
        let records = resolve(&tree, &[]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "usr/lib/systemd/system/foo.service");
        assert!(records[0].enable_on_install);
    }
}
