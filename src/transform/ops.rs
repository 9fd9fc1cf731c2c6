// src/transform/ops.rs
//! Tree mutations behind each transformation kind
//!
//! Each function returns the number of paths it touched, which feeds the
//! usage tracker.

use super::ReplacementRule;
use crate::error::{Error, Result};
use crate::filesystem::{Account, FileMode, NodeId, NodeKind, PackageTree, vfs::join};
use crate::matcher::{PathPattern, normalize_relative};
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn unmatched(pattern: &PathPattern, package: &str, site: &str) -> Error {
    Error::UnmatchedPattern {
        pattern: pattern.raw().to_string(),
        search_dirs: format!("the contents of {package}"),
        skipped: String::new(),
        site: site.to_string(),
    }
}

/// Directory at `path`, creating missing parts as implicit directories
fn ensure_directory(tree: &mut PackageTree, path: &str, site: &str) -> Result<NodeId> {
    tree.mkdir_p(path).map_err(|e| {
        let reason = format!("{e}; a `remove` rule before {site} may be needed");
        match e {
            crate::filesystem::TreeError::NotADirectory(at) => Error::path_conflict(at, reason, site),
            other => other.at(site),
        }
    })
}

pub(super) fn remove(
    tree: &mut PackageTree,
    package: &str,
    site: &str,
    patterns: &[PathPattern],
    keep_empty_parent_dirs: bool,
) -> Result<usize> {
    let mut total = 0;
    for pattern in patterns {
        let matches = pattern.find_matches(&*tree);
        if matches.is_empty() {
            return Err(unmatched(pattern, package, site));
        }
        for id in matches {
            if !tree.is_attached(id) {
                continue;
            }
            let Some(parent) = tree.get_node(id).parent() else {
                return Err(Error::InvalidPath(format!(
                    "cannot remove the root directory (definition: {site})"
                )));
            };
            debug!("{}: removing {}", site, tree.get_path(id));
            total += tree.remove(id).map_err(|e| e.at(site))?;
            if !keep_empty_parent_dirs {
                tree.prune_empty_dirs(parent);
            }
        }
    }
    Ok(total)
}

pub(super) fn move_paths(
    tree: &mut PackageTree,
    package: &str,
    site: &str,
    source: &PathPattern,
    target: &str,
) -> Result<usize> {
    let matches = source.find_matches(&*tree);
    if matches.is_empty() {
        return Err(unmatched(source, package, site));
    }
    let target_is_dir = target.ends_with('/');
    let target = normalize_relative(target);

    let target_dir = if target_is_dir {
        ensure_directory(tree, &target, site)?
    } else {
        let (dir_part, basename) = target.rsplit_once('/').unwrap_or(("", target.as_str()));
        if basename.is_empty() {
            return Err(Error::invalid_rule(site, "the move target cannot be the root directory"));
        }
        let parent = ensure_directory(tree, dir_part, site)?;
        match tree.lookup(&target) {
            Some(existing) if tree.get_node(existing).is_directory() => existing,
            existing => {
                if matches.len() > 1 {
                    let paths: Vec<String> = matches.iter().map(|&id| tree.get_path(id)).collect();
                    return Err(Error::AmbiguousRename {
                        pattern: source.raw().to_string(),
                        matches: format!(
                            "{}; end the target with \"/\" to move them into a directory",
                            paths.join(", ")
                        ),
                        site: site.to_string(),
                    });
                }
                let id = matches[0];
                if Some(id) == existing {
                    return Err(Error::invalid_rule(
                        site,
                        format!("{} is moved onto itself", tree.get_path(id)),
                    ));
                }
                if tree.is_descendant_of(parent, id) {
                    return Err(Error::invalid_rule(
                        site,
                        format!("cannot move {} into its own subtree", tree.get_path(id)),
                    ));
                }
                if let Some(existing) = existing {
                    debug!("{}: replacing {}", site, tree.get_path(existing));
                    tree.remove(existing).map_err(|e| e.at(site))?;
                }
                debug!("{}: renaming {} to {}", site, tree.get_path(id), target);
                tree.reparent_with_rename(id, parent, basename)
                    .map_err(|e| e.at(site))?;
                return Ok(1);
            }
        }
    };

    let target_path = tree.get_path(target_dir);
    let mut basenames: BTreeMap<String, String> = BTreeMap::new();
    for &id in &matches {
        let path = tree.get_path(id);
        if id == target_dir || tree.is_descendant_of(target_dir, id) {
            return Err(Error::invalid_rule(
                site,
                format!("cannot move {path} into itself ({target_path})"),
            ));
        }
        let name = tree.get_node(id).name().to_string();
        if let Some(other) = basenames.insert(name.clone(), path.clone()) {
            return Err(Error::AmbiguousRename {
                pattern: source.raw().to_string(),
                matches: format!("{other}, {path} (both named \"{name}\")"),
                site: site.to_string(),
            });
        }
        let dest = join(&target_path, &name);
        if let Some(existing) = tree.lookup(&dest) {
            if existing != id && tree.get_node(existing).is_directory() {
                return Err(Error::DirectoryMergeConflict {
                    source_path: path,
                    target: dest,
                    site: site.to_string(),
                });
            }
        }
    }

    let mut moved = 0;
    for id in matches {
        let name = tree.get_node(id).name().to_string();
        let dest = join(&target_path, &name);
        match tree.lookup(&dest) {
            Some(existing) if existing == id => continue,
            Some(existing) => {
                debug!("{}: overwriting {}", site, dest);
                tree.remove(existing).map_err(|e| e.at(site))?;
            }
            None => {}
        }
        debug!("{}: moving {} to {}", site, tree.get_path(id), dest);
        tree.reparent_with_rename(id, target_dir, &name)
            .map_err(|e| e.at(site))?;
        moved += 1;
    }
    Ok(moved)
}

pub(super) fn create_symlink(
    tree: &mut PackageTree,
    site: &str,
    path: &str,
    target: &str,
    replacement: ReplacementRule,
) -> Result<usize> {
    let path = normalize_relative(path);
    let Some(link_name) = path.rsplit('/').next().filter(|n| !n.is_empty()) else {
        return Err(Error::invalid_rule(site, "cannot replace the root directory with a symlink"));
    };
    let dir_part = path.strip_suffix(link_name).unwrap_or("").trim_end_matches('/');
    let target = if target.starts_with('/') {
        format!("/{}", normalize_relative(target))
    } else {
        target.to_string()
    };
    ensure_directory(tree, dir_part, site)?;

    if let Some(existing) = tree.lookup(&path) {
        let node = tree.get_node(existing);
        let (replace, reason) = match replacement {
            ReplacementRule::AbortOnNonEmptyDirectory => (
                !node.is_directory() || node.children().is_empty(),
                "the path is a non-empty directory",
            ),
            ReplacementRule::DiscardExisting => (true, ""),
            ReplacementRule::ErrorIfDirectory => (!node.is_directory(), "the path is a directory"),
            ReplacementRule::ErrorIfExists => (false, "the path exists"),
        };
        if !replace {
            return Err(Error::ReplacementPolicyViolation {
                path,
                rule: replacement.to_string(),
                reason: reason.to_string(),
                site: site.to_string(),
            });
        }
        debug!("{}: replacing existing {}", site, path);
        tree.remove(existing).map_err(|e| e.at(site))?;
    }

    tree.add_symlink(&path, &target).map_err(|e| e.at(site))?;
    debug!("{}: {} -> {}", site, path, target);
    Ok(1)
}

pub(super) fn create_directories(
    tree: &mut PackageTree,
    site: &str,
    paths: &[String],
    owner: Option<&Account>,
    group: Option<&Account>,
    mode: Option<&FileMode>,
) -> Result<usize> {
    for path in paths {
        let path = normalize_relative(path);
        if path.is_empty() {
            return Err(Error::invalid_rule(site, "cannot create the root directory"));
        }
        let id = ensure_directory(tree, &path, site)?;
        let node = tree.get_node(id);
        let mut meta = node.meta().clone();
        let source = node.source().cloned();
        if let Some(mode) = mode {
            meta.mode = mode.compute(meta.mode, true);
        }
        meta.owner = owner.cloned().unwrap_or_else(Account::root);
        meta.group = group.cloned().unwrap_or_else(Account::root);
        tree.insert(&path, NodeKind::Directory, meta, source)
            .map_err(|e| e.at(site))?;
    }
    Ok(paths.len())
}

/// Attribute changes requested by a `path-metadata` rule
pub(super) struct MetadataChange<'a> {
    pub owner: Option<&'a Account>,
    pub group: Option<&'a Account>,
    pub mode: Option<&'a FileMode>,
    pub capabilities: Option<&'a str>,
    pub capability_mode: Option<&'a FileMode>,
}

impl MetadataChange<'_> {
    /// Owner, group or mode only make sense on files
    fn needs_file(&self) -> bool {
        self.owner.is_some() || self.group.is_some() || self.mode.is_some()
    }

    fn apply(&self, tree: &mut PackageTree, id: NodeId, site: &str) {
        let is_dir = tree.get_node(id).is_directory();
        let is_file = tree.get_node(id).is_file();
        let path = tree.get_path(id);
        let meta = tree.meta_mut(id);
        if let Some(owner) = self.owner {
            meta.owner = owner.clone();
        }
        if let Some(group) = self.group {
            meta.group = group.clone();
        }
        if let Some(mode) = self.mode {
            meta.mode = mode.compute(meta.mode, is_dir);
        }
        if let (true, Some(caps)) = (is_file, self.capabilities) {
            if let Some(previous) = &meta.capabilities {
                warn!(
                    "Replacing the capabilities {} on {} due to {}",
                    previous, path, site
                );
            }
            meta.capabilities = Some(caps.to_string());
            if let Some(cap_mode) = self.capability_mode {
                meta.mode = cap_mode.compute(meta.mode, false);
            }
        }
    }
}

pub(super) fn path_metadata(
    tree: &mut PackageTree,
    package: &str,
    site: &str,
    patterns: &[PathPattern],
    change: &MetadataChange<'_>,
    recursive: bool,
) -> Result<usize> {
    let needs_file = change.needs_file();
    let mut recurse_into = Vec::new();
    let mut total = 0;

    for pattern in patterns {
        let mut matched = false;
        let mut saw_symlink = false;
        let mut saw_directory = false;

        for id in pattern.find_matches(&*tree) {
            let node = tree.get_node(id);
            if node.is_symlink() {
                saw_symlink = true;
                continue;
            }
            if node.is_file() || !needs_file {
                matched = true;
            }
            if node.is_directory() {
                saw_directory = true;
                if recursive {
                    if !matched {
                        matched = tree.descendants(id).iter().any(|&d| tree.get_node(d).is_file());
                    }
                    recurse_into.push(id);
                }
            }
            change.apply(tree, id, site);
            total += 1;
        }

        if !matched {
            if needs_file && (saw_directory || saw_symlink) {
                warn!(
                    "{} (from {}) matched no files, but owner, group and mode only apply to files",
                    pattern, site
                );
            } else if saw_symlink {
                warn!(
                    "{} (from {}) only matched symlinks, which path-metadata never changes",
                    pattern, site
                );
            }
            return Err(unmatched(pattern, package, site));
        }
    }

    for dir in recurse_into {
        for id in tree.descendants(dir) {
            if tree.get_node(id).is_symlink() {
                continue;
            }
            change.apply(tree, id, site);
            total += 1;
        }
    }
    Ok(total)
}
