// src/install/evaluator.rs
//! Installation rule evaluation
//!
//! Rules run strictly in order. For each pattern the search directories are
//! tried in order and the first directory with an acceptable match wins for
//! the packages it applies to. Discard rules are the exception: they always
//! look at every search directory.
//!
//! Claim decisions:
//!
//! - A glob skips paths that are claimed, discarded or automatically
//!   discardable, counting them for the error message.
//! - An exact pattern may take an automatically discardable path, but hitting
//!   a path claimed by another exact rule, or discarded by the manifest, is
//!   an [`Error::OverlappingInstall`].
//! - A rule that is disabled (false condition, or no target package built)
//!   still claims its matches as reservations, installs nothing and may
//!   match nothing.

use super::{Destination, InstallKind, InstallationRule, MultiDestination, man_destination};
use crate::condition::{BuildContext, ConditionContext};
use crate::error::{Error, Result};
use crate::filesystem::{NodeKind, NodeMeta, PackageTree, Provenance, ScanKind, vfs::join};
use crate::index::{Claim, EntryId, PathIndex};
use crate::matcher::PathPattern;
use crate::package::PackageSet;
use crate::usage::UsageTracker;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Result of running every installation rule
#[derive(Debug, Default)]
pub struct InstallOutcome {
    /// One tree per built package
    pub trees: BTreeMap<String, PackageTree>,
    /// Automatic discard rule name to number of paths it discarded
    pub auto_discarded: BTreeMap<String, usize>,
}

/// A match and the packages it is claimed for
struct Match {
    entry: EntryId,
    packages: Vec<String>,
}

#[derive(Default)]
struct Skipped {
    installed: usize,
    discarded: usize,
}

impl Skipped {
    fn describe(&self) -> String {
        match (self.installed, self.discarded) {
            (0, 0) => String::new(),
            (installed, 0) => format!(
                " after ignoring {installed} path(s) already matched by earlier rules; to install a path into several packages use multi-dest-install"
            ),
            (0, discarded) => format!(
                " after ignoring {discarded} discarded path(s); move the rule above the discard rule or list built-in discards by exact path"
            ),
            (installed, discarded) => format!(
                " after ignoring {} path(s) already matched by earlier install or discard rules",
                installed + discarded
            ),
        }
    }
}

/// Runs installation rules against a path index
pub struct InstallEvaluator<'a> {
    index: &'a mut PathIndex,
    packages: &'a PackageSet,
    build: &'a BuildContext,
    usage: &'a mut UsageTracker,
    trees: BTreeMap<String, PackageTree>,
}

impl<'a> InstallEvaluator<'a> {
    pub fn new(
        index: &'a mut PathIndex,
        packages: &'a PackageSet,
        build: &'a BuildContext,
        usage: &'a mut UsageTracker,
    ) -> Self {
        let trees = packages
            .iter()
            .filter(|p| p.built)
            .map(|p| (p.name.clone(), PackageTree::new()))
            .collect();
        Self {
            index,
            packages,
            build,
            usage,
            trees,
        }
    }

    /// Evaluate all rules, then apply the automatic discard rules
    pub fn run(mut self, rules: &[InstallationRule]) -> Result<InstallOutcome> {
        for rule in rules {
            rule.validate(self.packages)?;
            self.usage.declare(&rule.id());
        }
        for rule in rules {
            self.apply(rule)?;
        }

        let auto_discarded = self.index.apply_auto_discards();
        for (rule, count) in &auto_discarded {
            info!("Automatic discard rule {} removed {} path(s)", rule, count);
        }
        Ok(InstallOutcome {
            trees: self.trees,
            auto_discarded,
        })
    }

    fn apply(&mut self, rule: &InstallationRule) -> Result<()> {
        let id = rule.id();
        let mut enabled = match &rule.condition {
            Some(condition) => condition
                .evaluate(&ConditionContext::source(self.build))
                .map_err(|e| e.at(&rule.site))?,
            None => true,
        };
        if rule.is_documentation() && !self.build.build_docs() {
            debug!("{}: documentation is not built", rule.site);
            enabled = false;
        }

        if let InstallKind::Discard {
            patterns,
            search_dirs,
        } = &rule.kind
        {
            let matched = self.discard(rule, patterns, search_dirs.as_deref(), enabled)?;
            if enabled {
                self.usage.record(&id, matched);
            } else {
                self.usage.skip_condition_false(&id);
            }
            return Ok(());
        }

        let into = rule.into_packages();
        let built: BTreeSet<&str> = into
            .iter()
            .copied()
            .filter(|p| self.packages.is_built(p))
            .collect();
        let active = enabled && !built.is_empty();
        let files_only = matches!(rule.kind, InstallKind::InstallMan { .. });

        let mut total = 0;
        for pattern in rule.sources() {
            let matches = self.resolve(rule, pattern, &into, !active, files_only)?;
            if rule.requires_single_match() && matches.len() > 1 {
                let paths: Vec<String> = matches
                    .iter()
                    .map(|m| self.index.entry(m.entry).path.clone())
                    .collect();
                return Err(Error::AmbiguousRename {
                    pattern: pattern.raw().to_string(),
                    matches: paths.join(", "),
                    site: rule.site.clone(),
                });
            }
            total += matches.len();

            for m in matches {
                if !self.index.claim(m.entry).is_unclaimed() {
                    // Swept in by an earlier match of the same rule
                    continue;
                }
                let claim = if active {
                    Claim::Installed {
                        packages: m.packages.clone(),
                        site: rule.site.clone(),
                        exact: pattern.is_exact(),
                    }
                } else {
                    Claim::Reserved {
                        packages: m.packages.clone(),
                        site: rule.site.clone(),
                        exact: pattern.is_exact(),
                    }
                };
                let claimed = self.index.claim_subtree(m.entry, claim);
                if active {
                    let targets: Vec<&str> = m
                        .packages
                        .iter()
                        .map(String::as_str)
                        .filter(|p| built.contains(p))
                        .collect();
                    self.materialize(rule, &claimed, &targets)?;
                }
            }
        }

        if !enabled {
            self.usage.skip_condition_false(&id);
        } else if built.is_empty() {
            self.usage.skip_not_applicable(&id);
        } else {
            info!("{}: {} match(es)", rule.site, total);
            self.usage.record(&id, total);
        }
        Ok(())
    }

    /// Find the matches of one pattern for the target packages
    fn resolve(
        &self,
        rule: &InstallationRule,
        pattern: &PathPattern,
        into: &[&str],
        allow_empty: bool,
        files_only: bool,
    ) -> Result<Vec<Match>> {
        let mut missing: BTreeSet<&str> = into.iter().copied().collect();
        let mut found = Vec::new();
        let mut skipped = Skipped::default();

        for (dir, search_dir) in self.index.search_dirs().iter().enumerate() {
            let applicable: Vec<String> = search_dir
                .applies_to
                .iter()
                .filter(|p| missing.contains(p.as_str()))
                .cloned()
                .collect();
            if applicable.is_empty() {
                continue;
            }

            let mut matched_here = false;
            for id in pattern.find_matches(&self.index.view(dir)) {
                let entry = self.index.entry(id);
                if files_only && entry.kind != ScanKind::File {
                    continue;
                }
                if !self.accept(rule, pattern, id, &applicable, &mut skipped)? {
                    continue;
                }
                found.push(Match {
                    entry: id,
                    packages: applicable.clone(),
                });
                matched_here = true;
            }

            if matched_here {
                for package in &applicable {
                    missing.remove(package.as_str());
                }
                if missing.is_empty() {
                    break;
                }
            }
        }

        if found.is_empty() && !allow_empty {
            return Err(self.unmatched(rule, pattern, &skipped, None));
        }
        Ok(found)
    }

    /// Decide whether a matched entry may be claimed by this pattern
    fn accept(
        &self,
        rule: &InstallationRule,
        pattern: &PathPattern,
        id: EntryId,
        packages: &[String],
        skipped: &mut Skipped,
    ) -> Result<bool> {
        let entry = self.index.entry(id);
        let claim = self.index.claim(id);

        if pattern.is_exact() {
            if claim.is_exact_install() || matches!(claim, Claim::Discarded { .. }) {
                return Err(Error::OverlappingInstall {
                    path: entry.path.clone(),
                    package: if packages.is_empty() {
                        "nothing (discard)".to_string()
                    } else {
                        packages.join(", ")
                    },
                    claimant: claim.to_string(),
                    site: rule.site.clone(),
                });
            }
            if !claim.is_unclaimed() {
                debug!("{}: {} was already claimed by {}", rule.site, entry.path, claim);
                skipped.installed += 1;
                return Ok(false);
            }
            return Ok(true);
        }

        match claim {
            Claim::Unclaimed if entry.auto_discard.is_some() => skipped.discarded += 1,
            Claim::Unclaimed => return Ok(true),
            Claim::Discarded { .. } | Claim::AutoDiscarded { .. } => skipped.discarded += 1,
            Claim::Installed { .. } | Claim::Reserved { .. } => skipped.installed += 1,
        }
        Ok(false)
    }

    fn unmatched(
        &self,
        rule: &InstallationRule,
        pattern: &PathPattern,
        skipped: &Skipped,
        dirs: Option<&[usize]>,
    ) -> Error {
        let names: Vec<&str> = match dirs {
            Some(dirs) => dirs
                .iter()
                .map(|&d| self.index.search_dir(d).name.as_str())
                .collect(),
            None => self
                .index
                .search_dirs()
                .iter()
                .map(|d| d.name.as_str())
                .collect(),
        };
        Error::UnmatchedPattern {
            pattern: pattern.raw().to_string(),
            search_dirs: names.join(", "),
            skipped: skipped.describe(),
            site: rule.site.clone(),
        }
    }

    /// Apply a discard rule across its search directories
    fn discard(
        &mut self,
        rule: &InstallationRule,
        patterns: &[PathPattern],
        limit_to: Option<&[String]>,
        enabled: bool,
    ) -> Result<usize> {
        let dirs: Vec<usize> = match limit_to {
            Some(names) => names
                .iter()
                .map(|name| {
                    let wanted = crate::matcher::normalize_relative(name);
                    self.index
                        .search_dirs()
                        .iter()
                        .position(|d| crate::matcher::normalize_relative(&d.name) == wanted)
                        .ok_or_else(|| {
                            Error::invalid_rule(
                                &rule.site,
                                format!("unknown search directory \"{name}\""),
                            )
                        })
                })
                .collect::<Result<_>>()?,
            None => (0..self.index.search_dirs().len()).collect(),
        };
        let any_exists = dirs.iter().any(|&d| self.index.search_dir(d).exists);

        let mut total = 0;
        for pattern in patterns {
            let mut skipped = Skipped::default();
            let mut accepted = Vec::new();
            for &dir in &dirs {
                for id in pattern.find_matches(&self.index.view(dir)) {
                    if pattern.is_exact() {
                        if self.accept(rule, pattern, id, &[], &mut skipped)? {
                            accepted.push(id);
                        }
                        continue;
                    }
                    match self.index.claim(id) {
                        Claim::Unclaimed => accepted.push(id),
                        Claim::Discarded { .. } | Claim::AutoDiscarded { .. } => {
                            skipped.discarded += 1
                        }
                        _ => skipped.installed += 1,
                    }
                }
            }

            if accepted.is_empty() && enabled && any_exists {
                return Err(self.unmatched(rule, pattern, &skipped, Some(&dirs)));
            }
            for id in accepted {
                if !self.index.claim(id).is_unclaimed() {
                    continue;
                }
                let claim = if enabled {
                    Claim::Discarded {
                        site: rule.site.clone(),
                    }
                } else {
                    Claim::Reserved {
                        packages: Vec::new(),
                        site: rule.site.clone(),
                        exact: pattern.is_exact(),
                    }
                };
                let claimed = self.index.claim_subtree(id, claim);
                debug!("{}: discarded {} path(s)", rule.site, claimed.len());
                total += 1;
            }
        }
        Ok(total)
    }

    /// Copy claimed entries into the target package trees
    fn materialize(
        &mut self,
        rule: &InstallationRule,
        claimed: &[EntryId],
        packages: &[&str],
    ) -> Result<()> {
        let Some(&root_id) = claimed.first() else {
            return Ok(());
        };
        let root = self.index.entry(root_id).clone();

        for &package in packages {
            let dests = self.destinations(rule, root_id, package)?;
            for dest in dests {
                debug!("{}: {} -> {}:{}", rule.site, root.path, package, dest);
                for &id in claimed {
                    let entry = self.index.entry(id);
                    let target = if id == root_id {
                        dest.clone()
                    } else {
                        let rel = entry
                            .path
                            .strip_prefix(&root.path)
                            .map(|r| r.trim_start_matches('/'))
                            .unwrap_or(&entry.path);
                        join(&dest, rel)
                    };
                    let kind = match &entry.kind {
                        ScanKind::File => NodeKind::File,
                        ScanKind::Directory => NodeKind::Directory,
                        ScanKind::Symlink { target } => NodeKind::Symlink {
                            target: target.clone(),
                        },
                    };
                    let meta = match kind {
                        NodeKind::Symlink { .. } => NodeMeta::root_owned(0o777),
                        _ => NodeMeta::root_owned(entry.mode),
                    };
                    let source = Provenance {
                        search_dir: self.index.search_dir(entry.search_dir).name.clone(),
                        path: entry.path.clone(),
                        fs_path: entry.fs_path.clone(),
                    };
                    let Some(tree) = self.trees.get_mut(package) else {
                        continue;
                    };
                    tree.insert(&target, kind, meta, Some(source))
                        .map_err(|e| e.at(&rule.site))?;
                }
            }
        }
        Ok(())
    }

    fn destinations(&self, rule: &InstallationRule, id: EntryId, package: &str) -> Result<Vec<String>> {
        let entry = self.index.entry(id);
        let name = entry.name.as_str();
        let doc_main = self
            .packages
            .get(package)
            .map_or(package, |p| p.doc_main_package.as_str());

        let dests = match &rule.kind {
            InstallKind::Install { dest, .. } => vec![match dest {
                Destination::Default => entry.path.clone(),
                Destination::DestDir(dir) => join(dir, name),
                Destination::As(path) => path.clone(),
            }],
            InstallKind::InstallDocs { dest, .. } => vec![match dest {
                Destination::Default => format!("usr/share/doc/{doc_main}/{name}"),
                Destination::DestDir(dir) => join(dir, name),
                Destination::As(path) => path.clone(),
            }],
            InstallKind::InstallExamples { .. } => {
                vec![format!("usr/share/doc/{doc_main}/examples/{name}")]
            }
            InstallKind::MultiDestInstall { dest, .. } => match dest {
                MultiDestination::DestDirs(dirs) => dirs.iter().map(|d| join(d, name)).collect(),
                MultiDestination::As(paths) => paths.clone(),
            },
            InstallKind::InstallMan {
                section, language, ..
            } => {
                let content = if section.is_none() {
                    match std::fs::read_to_string(&entry.fs_path) {
                        Ok(content) => Some(content),
                        Err(e) => {
                            debug!("Cannot read {}: {}", entry.fs_path.display(), e);
                            None
                        }
                    }
                } else {
                    None
                };
                vec![man_destination(
                    &entry.path,
                    name,
                    content.as_deref(),
                    section.as_deref(),
                    language.as_ref(),
                    &rule.site,
                )?]
            }
            InstallKind::Discard { .. } => Vec::new(),
        };

        dests
            .into_iter()
            .map(|d| {
                let normalized = crate::matcher::normalize_relative(&d);
                if normalized.is_empty() {
                    Err(Error::invalid_rule(
                        &rule.site,
                        format!("destination \"{d}\" for {} is the root directory", entry.path),
                    ))
                } else {
                    Ok(normalized)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::ScannedDir;
    use crate::package::PackageDef;
    use crate::plugin::CapabilityRegistry;

    struct Fixture {
        index: PathIndex,
        packages: PackageSet,
        build: BuildContext,
    }

    impl Fixture {
        fn new(paths: &[&str], packages: &[(&str, &str)]) -> Self {
            let build = BuildContext::new("amd64");
            let defs: Vec<PackageDef> = packages
                .iter()
                .map(|(name, arch)| PackageDef::new(*name, *arch))
                .collect();
            let packages = PackageSet::resolve(&defs, &build).unwrap();
            let registry = CapabilityRegistry::builtin().unwrap();
            let index = PathIndex::build(
                vec![(
                    "debian/tmp".to_string(),
                    packages.names().into_iter().collect(),
                    ScannedDir::from_paths("debian/tmp", paths),
                )],
                &registry,
            );
            Self {
                index,
                packages,
                build,
            }
        }

        fn run(&mut self, rules: &[InstallationRule]) -> Result<InstallOutcome> {
            let mut usage = UsageTracker::new();
            let outcome =
                InstallEvaluator::new(&mut self.index, &self.packages, &self.build, &mut usage)
                    .run(rules)?;
            usage.check(&Default::default())?;
            Ok(outcome)
        }
    }

    fn install(site: &str, source: &str, into: &str) -> InstallationRule {
        InstallationRule::new(
            site,
            InstallKind::Install {
                sources: vec![PathPattern::parse(source).unwrap()],
                dest: Destination::Default,
                into: into.to_string(),
            },
        )
    }

    fn tree_paths(tree: &PackageTree) -> Vec<String> {
        let mut paths = Vec::new();
        tree.walk(|_, _, path| {
            if !path.is_empty() {
                paths.push(path.to_string());
            }
        });
        paths
    }

    #[test]
    fn test_exact_before_glob() {
        let mut fx = Fixture::new(&["usr/bin/foo", "usr/bin/bar"], &[("a", "any"), ("b", "any")]);
        let outcome = fx
            .run(&[
                install("installations[0].install", "usr/bin/foo", "a"),
                install("installations[1].install", "usr/*", "b"),
            ])
            .unwrap();
        assert_eq!(tree_paths(&outcome.trees["a"]), vec!["usr", "usr/bin", "usr/bin/foo"]);
        assert_eq!(tree_paths(&outcome.trees["b"]), vec!["usr", "usr/bin", "usr/bin/bar"]);
        let tree = &outcome.trees["a"];
        assert!(!tree.get_node(tree.lookup("usr/bin").unwrap()).is_explicit());
    }

    #[test]
    fn test_glob_before_exact_is_unmatched() {
        let mut fx = Fixture::new(&["usr/bin/foo", "usr/bin/bar"], &[("a", "any"), ("b", "any")]);
        let err = fx
            .run(&[
                install("installations[0].install", "usr/*", "b"),
                install("installations[1].install", "usr/bin/foo", "a"),
            ])
            .unwrap_err();
        assert_eq!(err.code(), "unmatched-pattern");
        assert_eq!(err.site(), Some("installations[1].install"));
        assert!(err.to_string().contains("already matched"), "{err}");
    }

    #[test]
    fn test_exact_overlap() {
        let mut fx = Fixture::new(&["usr/bin/foo"], &[("a", "any"), ("b", "any")]);
        let err = fx
            .run(&[
                install("installations[0].install", "usr/bin/foo", "a"),
                install("installations[1].install", "usr/bin/foo", "b"),
            ])
            .unwrap_err();
        assert_eq!(err.code(), "overlapping-install");
        assert!(err.to_string().contains("installations[0].install"));
    }

    #[test]
    fn test_auto_discard_precedence() {
        let mut fx = Fixture::new(
            &["usr/lib/libfoo.la", "usr/lib/libbar.la", "usr/lib/libfoo.so"],
            &[("a", "any")],
        );
        let outcome = fx
            .run(&[
                install("installations[0].install", "usr/lib/libfoo.la", "a"),
                install("installations[1].install", "usr/lib/*", "a"),
            ])
            .unwrap();
        assert_eq!(
            tree_paths(&outcome.trees["a"]),
            vec!["usr", "usr/lib", "usr/lib/libfoo.la", "usr/lib/libfoo.so"]
        );
        assert_eq!(outcome.auto_discarded.get("la-files"), Some(&1));
    }

    #[test]
    fn test_glob_never_overrides_auto_discard() {
        let mut fx = Fixture::new(&["usr/lib/libfoo.la"], &[("a", "any")]);
        let err = fx.run(&[install("installations[0].install", "usr/lib/*.la", "a")]).unwrap_err();
        assert_eq!(err.code(), "unmatched-pattern");
        assert!(err.to_string().contains("discarded"), "{err}");
    }

    #[test]
    fn test_discard_then_install() {
        let mut fx = Fixture::new(&["usr/share/foo/a", "usr/share/foo/b"], &[("a", "any")]);
        let discard = InstallationRule::new(
            "installations[0].discard",
            InstallKind::Discard {
                patterns: vec![PathPattern::parse("usr/share/foo/a").unwrap()],
                search_dirs: None,
            },
        );
        let outcome = fx
            .run(&[discard.clone(), install("installations[1].install", "usr/share", "a")])
            .unwrap();
        assert_eq!(
            tree_paths(&outcome.trees["a"]),
            vec!["usr", "usr/share", "usr/share/foo", "usr/share/foo/b"]
        );

        let mut fx = Fixture::new(&["usr/share/foo/a"], &[("a", "any")]);
        let err = fx
            .run(&[discard, install("installations[1].install", "usr/share/foo/a", "a")])
            .unwrap_err();
        assert_eq!(err.code(), "overlapping-install");
    }

    #[test]
    fn test_dest_dir_and_as() {
        let mut fx = Fixture::new(&["build/foo.conf", "build/x/1", "build/x/2"], &[("a", "any")]);
        let rules = vec![
            InstallationRule::new(
                "installations[0].install",
                InstallKind::Install {
                    sources: vec![PathPattern::parse("build/foo.conf").unwrap()],
                    dest: Destination::As("etc/foo/foo.conf".to_string()),
                    into: "a".to_string(),
                },
            ),
            InstallationRule::new(
                "installations[1].install",
                InstallKind::Install {
                    sources: vec![PathPattern::parse("build/x").unwrap()],
                    dest: Destination::DestDir("usr/share/foo".to_string()),
                    into: "a".to_string(),
                },
            ),
        ];
        let outcome = fx.run(&rules).unwrap();
        let tree = &outcome.trees["a"];
        assert!(tree.exists("etc/foo/foo.conf"));
        assert!(tree.exists("usr/share/foo/x/1"));
        assert!(tree.exists("usr/share/foo/x/2"));
        assert_eq!(
            tree.get_node(tree.lookup("etc/foo/foo.conf").unwrap()).source().unwrap().path,
            "build/foo.conf"
        );
    }

    #[test]
    fn test_as_with_multiple_matches() {
        let mut fx = Fixture::new(&["build/a.conf", "build/b.conf"], &[("a", "any")]);
        let rule = InstallationRule::new(
            "installations[0].install",
            InstallKind::Install {
                sources: vec![PathPattern::parse("build/*.conf").unwrap()],
                dest: Destination::As("etc/foo.conf".to_string()),
                into: "a".to_string(),
            },
        );
        let err = fx.run(&[rule]).unwrap_err();
        assert_eq!(err.code(), "ambiguous-rename");
    }

    #[test]
    fn test_multi_dest_install() {
        let mut fx = Fixture::new(&["usr/share/foo/data"], &[("a", "any"), ("b", "all")]);
        let rule = InstallationRule::new(
            "installations[0].multi-dest-install",
            InstallKind::MultiDestInstall {
                sources: vec![PathPattern::parse("usr/share/foo/data").unwrap()],
                dest: MultiDestination::DestDirs(vec!["usr/share/a".to_string(), "usr/share/b".to_string()]),
                into: vec!["a".to_string(), "b".to_string()],
            },
        );
        let outcome = fx.run(&[rule]).unwrap();
        for package in ["a", "b"] {
            let tree = &outcome.trees[package];
            assert!(tree.exists("usr/share/a/data"), "{package}");
            assert!(tree.exists("usr/share/b/data"), "{package}");
        }
    }

    #[test]
    fn test_false_condition_reserves() {
        use crate::condition::Condition;
        let mut fx = Fixture::new(&["usr/bin/foo", "usr/bin/bar"], &[("a", "any"), ("b", "any")]);
        let disabled = install("installations[0].install", "usr/bin/foo", "a")
            .with_condition(Condition::CrossCompiling);
        let outcome = fx
            .run(&[disabled, install("installations[1].install", "usr/bin/*", "b")])
            .unwrap();
        assert!(tree_paths(&outcome.trees["a"]).is_empty());
        assert_eq!(tree_paths(&outcome.trees["b"]), vec!["usr", "usr/bin", "usr/bin/bar"]);
    }

    #[test]
    fn test_unbuilt_package_may_match_nothing() {
        let mut fx = Fixture::new(&["usr/bin/foo"], &[("a", "any"), ("arm", "arm64")]);
        let outcome = fx
            .run(&[
                install("installations[0].install", "usr/bin/foo", "a"),
                install("installations[1].install", "usr/lib/arm-only", "arm"),
            ])
            .unwrap();
        assert!(!outcome.trees.contains_key("arm"));
    }

    #[test]
    fn test_unused_discard_rule() {
        let mut fx = Fixture::new(&["usr/bin/foo"], &[("a", "any")]);
        let discard = InstallationRule::new(
            "installations[1].discard",
            InstallKind::Discard {
                patterns: vec![PathPattern::parse("*.pyc").unwrap()],
                search_dirs: None,
            },
        );
        let err = fx
            .run(&[install("installations[0].install", "usr", "a"), discard])
            .unwrap_err();
        assert_eq!(err.code(), "unmatched-pattern");
    }

    #[test]
    fn test_install_docs_and_man() {
        let mut fx = Fixture::new(
            &["README", "docs/foo.1", "docs/foo.de.1", "docs/examples/"],
            &[("foo", "any"), ("foo-doc", "all")],
        );
        let rules = vec![
            InstallationRule::new(
                "installations[0].install-docs",
                InstallKind::InstallDocs {
                    sources: vec![PathPattern::parse("README").unwrap()],
                    dest: Destination::Default,
                    into: "foo-doc".to_string(),
                },
            ),
            InstallationRule::new(
                "installations[1].install-man",
                InstallKind::InstallMan {
                    sources: vec![PathPattern::parse("docs/*").unwrap()],
                    section: None,
                    language: Some(super::super::ManLanguage::DeriveFromBasename),
                    into: "foo".to_string(),
                },
            ),
        ];
        let mut all = rules.clone();
        all.push(install("installations[2].install", "docs/examples", "foo"));
        let outcome = fx.run(&all).unwrap();
        assert!(outcome.trees["foo-doc"].exists("usr/share/doc/foo/README"));
        assert!(outcome.trees["foo"].exists("usr/share/man/man1/foo.1"));
        assert!(outcome.trees["foo"].exists("usr/share/man/de/man1/foo.1"));
    }

    #[test]
    fn test_docs_skipped_with_nodoc() {
        let mut fx = Fixture::new(&["README"], &[("foo", "any")]);
        fx.build = BuildContext::new("amd64").with_build_options("nodoc");
        let rule = InstallationRule::new(
            "installations[0].install-docs",
            InstallKind::InstallDocs {
                sources: vec![PathPattern::parse("README").unwrap()],
                dest: Destination::Default,
                into: "foo".to_string(),
            },
        );
        let outcome = fx.run(&[rule]).unwrap();
        assert!(tree_paths(&outcome.trees["foo"]).is_empty());
    }
}
