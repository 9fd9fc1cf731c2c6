// src/index/mod.rs
//! Virtual path index over the ordered search directories
//!
//! Every scanned path becomes a [`SourceEntry`] in one arena, addressed by
//! [`EntryId`]. Claim state is kept per on-disk location rather than per
//! entry: when one search directory is nested in another (the source root
//! contains `debian/tmp`), both entries share a claim slot, so claiming a
//! path through either directory claims it for both.
//!
//! Automatic discard verdicts are computed once, while the index is built.
//! A directory's verdict is inherited by everything below it.

use crate::filesystem::{ScanKind, ScannedDir};
use crate::matcher::PathTree;
use crate::plugin::{CapabilityRegistry, DiscardCandidate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stable handle of an index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// Claim state of a source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Unclaimed,
    /// Installed into the packages by the rule at `site`
    Installed {
        packages: Vec<String>,
        site: String,
        exact: bool,
    },
    /// Matched by a rule that is disabled for this build; nothing installed
    Reserved {
        packages: Vec<String>,
        site: String,
        exact: bool,
    },
    /// Removed from consideration by a manifest discard rule
    Discarded { site: String },
    /// Removed by an automatic discard rule after all explicit rules ran
    AutoDiscarded { rule: String },
}

impl Claim {
    pub fn is_unclaimed(&self) -> bool {
        matches!(self, Self::Unclaimed)
    }

    /// Claimed by an exact-path install (or reservation)
    pub fn is_exact_install(&self) -> bool {
        matches!(
            self,
            Self::Installed { exact: true, .. } | Self::Reserved { exact: true, .. }
        )
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Self::Discarded { .. } | Self::AutoDiscarded { .. })
    }

    /// The same claim as applied to paths swept in by a directory match
    fn implied(&self) -> Self {
        match self {
            Self::Installed { packages, site, .. } => Self::Installed {
                packages: packages.clone(),
                site: site.clone(),
                exact: false,
            },
            Self::Reserved { packages, site, .. } => Self::Reserved {
                packages: packages.clone(),
                site: site.clone(),
                exact: false,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclaimed => f.write_str("nothing"),
            Self::Installed { packages, site, .. } => {
                write!(f, "{} (definition: {site})", packages.join(", "))
            }
            Self::Reserved { packages, site, .. } => {
                write!(f, "{} via a disabled rule (definition: {site})", packages.join(", "))
            }
            Self::Discarded { site } => write!(f, "the discard rule at {site}"),
            Self::AutoDiscarded { rule } => write!(f, "the automatic discard rule {rule}"),
        }
    }
}

/// Automatic discard verdict of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDiscard {
    pub rule: String,
    /// Verdict comes from an ancestor directory
    pub inherited: bool,
}

/// A path visible through a search directory
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub name: String,
    /// Relative to the search directory; the search directory itself is `""`
    pub path: String,
    pub kind: ScanKind,
    pub mode: u32,
    pub fs_path: PathBuf,
    pub search_dir: usize,
    pub parent: Option<EntryId>,
    pub auto_discard: Option<AutoDiscard>,
    children: Vec<EntryId>,
    slot: usize,
}

impl SourceEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == ScanKind::Directory
    }

    pub fn children(&self) -> &[EntryId] {
        &self.children
    }
}

/// One search directory in resolution order
#[derive(Debug, Clone)]
pub struct SearchDir {
    /// As configured, e.g. `debian/tmp`
    pub name: String,
    pub root: PathBuf,
    pub exists: bool,
    /// Packages this directory is searched for
    pub applies_to: BTreeSet<String>,
    root_entry: EntryId,
}

/// Arena of every path visible from the search directories
#[derive(Debug, Default)]
pub struct PathIndex {
    entries: Vec<SourceEntry>,
    claims: Vec<Claim>,
    dirs: Vec<SearchDir>,
    lookup: Vec<HashMap<String, EntryId>>,
}

/// Drop `.` components so nested search directories agree on locations
fn normalize_fs_path(path: &Path) -> PathBuf {
    path.components().filter(|c| *c != Component::CurDir).collect()
}

impl PathIndex {
    /// Build the index from scans given in search order
    ///
    /// Each element pairs the configured directory name and the packages it
    /// applies to with its scan result.
    pub fn build(
        scans: Vec<(String, BTreeSet<String>, ScannedDir)>,
        registry: &CapabilityRegistry,
    ) -> Self {
        let mut index = Self::default();
        let mut slots: HashMap<PathBuf, usize> = HashMap::new();

        for (dir_index, (name, applies_to, scan)) in scans.into_iter().enumerate() {
            let mut paths = HashMap::new();
            let root_fs = normalize_fs_path(&scan.root);
            let root_entry = index.push_entry(
                &mut slots,
                SourceEntry {
                    name: String::new(),
                    path: String::new(),
                    kind: ScanKind::Directory,
                    mode: 0o755,
                    fs_path: root_fs,
                    search_dir: dir_index,
                    parent: None,
                    auto_discard: None,
                    children: Vec::new(),
                    slot: 0,
                },
            );
            paths.insert(String::new(), root_entry);

            for scanned in scan.entries {
                let (parent_path, entry_name) = scanned
                    .path
                    .rsplit_once('/')
                    .unwrap_or(("", scanned.path.as_str()));
                let Some(&parent) = paths.get(parent_path) else {
                    debug!("Skipping {} without a scanned parent", scanned.path);
                    continue;
                };
                let entry_name = entry_name.to_string();
                let id = index.push_entry(
                    &mut slots,
                    SourceEntry {
                        name: entry_name,
                        path: scanned.path.clone(),
                        kind: scanned.kind,
                        mode: scanned.mode,
                        fs_path: normalize_fs_path(&scanned.fs_path),
                        search_dir: dir_index,
                        parent: Some(parent),
                        auto_discard: None,
                        children: Vec::new(),
                        slot: 0,
                    },
                );
                index.entries[parent.0].children.push(id);
                paths.insert(scanned.path, id);
            }

            index.dirs.push(SearchDir {
                name,
                root: scan.root,
                exists: scan.exists,
                applies_to,
                root_entry,
            });
            index.lookup.push(paths);
        }

        index.sort_children();
        index.compute_auto_discards(registry);
        index
    }

    fn push_entry(&mut self, slots: &mut HashMap<PathBuf, usize>, mut entry: SourceEntry) -> EntryId {
        let next_slot = self.claims.len();
        let slot = *slots.entry(entry.fs_path.clone()).or_insert(next_slot);
        if slot == next_slot {
            self.claims.push(Claim::Unclaimed);
        }
        entry.slot = slot;
        let id = EntryId(self.entries.len());
        self.entries.push(entry);
        id
    }

    fn sort_children(&mut self) {
        for i in 0..self.entries.len() {
            let mut children = std::mem::take(&mut self.entries[i].children);
            children.sort_by(|a, b| self.entries[a.0].name.cmp(&self.entries[b.0].name));
            self.entries[i].children = children;
        }
    }

    /// Parents precede children in the arena, so one forward pass suffices
    fn compute_auto_discards(&mut self, registry: &CapabilityRegistry) {
        for i in 0..self.entries.len() {
            let Some(parent) = self.entries[i].parent else {
                continue;
            };
            if let Some(verdict) = &self.entries[parent.0].auto_discard {
                self.entries[i].auto_discard = Some(AutoDiscard {
                    rule: verdict.rule.clone(),
                    inherited: true,
                });
                continue;
            }

            let entry = &self.entries[i];
            let siblings: Vec<&str> = self.entries[parent.0]
                .children
                .iter()
                .filter(|c| c.0 != i)
                .map(|c| self.entries[c.0].name.as_str())
                .collect();
            let candidate = DiscardCandidate {
                path: &entry.path,
                name: &entry.name,
                is_dir: entry.is_dir(),
                is_file: entry.kind == ScanKind::File,
                siblings: &siblings,
            };
            let verdict = registry.auto_discard_verdict(&candidate).map(|rule| AutoDiscard {
                rule: rule.to_string(),
                inherited: false,
            });
            if let Some(verdict) = &verdict {
                debug!("{} is discarded by {}", entry.path, verdict.rule);
            }
            self.entries[i].auto_discard = verdict;
        }
    }

    pub fn search_dirs(&self) -> &[SearchDir] {
        &self.dirs
    }

    pub fn search_dir(&self, dir: usize) -> &SearchDir {
        &self.dirs[dir]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &SourceEntry {
        &self.entries[id.0]
    }

    pub fn claim(&self, id: EntryId) -> &Claim {
        &self.claims[self.entries[id.0].slot]
    }

    pub fn lookup(&self, dir: usize, path: &str) -> Option<EntryId> {
        self.lookup.get(dir)?.get(path).copied()
    }

    /// Pattern-matching view of one search directory
    pub fn view(&self, dir: usize) -> SearchDirView<'_> {
        SearchDirView { index: self, dir }
    }

    /// Claim `id` and every unclaimed path below it
    ///
    /// Descendants that are already claimed, or carry their own automatic
    /// discard verdict, are skipped along with their subtrees. Returns the
    /// claimed entries with `id` first, parents before children.
    pub fn claim_subtree(&mut self, id: EntryId, claim: Claim) -> Vec<EntryId> {
        let implied = claim.implied();
        let sweeps_auto = claim.is_discard();
        let mut claimed = vec![id];
        self.claims[self.entries[id.0].slot] = claim;

        let mut stack: Vec<EntryId> = self.entries[id.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let entry = &self.entries[current.0];
            let own_verdict = entry.auto_discard.as_ref().is_some_and(|v| !v.inherited);
            if !self.claims[entry.slot].is_unclaimed() || (own_verdict && !sweeps_auto) {
                continue;
            }
            self.claims[entry.slot] = implied.clone();
            claimed.push(current);
            stack.extend(entry.children.iter().rev().copied());
        }
        claimed
    }

    /// Discard every remaining path with an automatic verdict
    ///
    /// Returns how many paths each rule discarded.
    pub fn apply_auto_discards(&mut self) -> BTreeMap<String, usize> {
        let mut applied: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &self.entries {
            let Some(verdict) = &entry.auto_discard else {
                continue;
            };
            if self.claims[entry.slot].is_unclaimed() {
                self.claims[entry.slot] = Claim::AutoDiscarded {
                    rule: verdict.rule.clone(),
                };
                *applied.entry(verdict.rule.clone()).or_default() += 1;
            }
        }
        applied
    }

    /// Unclaimed files, symlinks and empty directories below a search dir
    pub fn detect_missing(&self, dir: usize) -> Vec<EntryId> {
        let mut missing = Vec::new();
        let Some(search_dir) = self.dirs.get(dir) else {
            return missing;
        };
        let mut stack: Vec<EntryId> = self.entries[search_dir.root_entry.0]
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            let entry = &self.entries[id.0];
            let unclaimed = self.claims[entry.slot].is_unclaimed();
            if entry.is_dir() && !entry.children.is_empty() {
                stack.extend(entry.children.iter().rev().copied());
            } else if unclaimed {
                missing.push(id);
            }
        }
        missing
    }
}

/// One search directory seen as a [`PathTree`]
#[derive(Clone, Copy)]
pub struct SearchDirView<'a> {
    index: &'a PathIndex,
    dir: usize,
}

impl PathTree for SearchDirView<'_> {
    type Id = EntryId;

    fn root(&self) -> EntryId {
        self.index.dirs[self.dir].root_entry
    }

    fn lookup(&self, path: &str) -> Option<EntryId> {
        self.index.lookup(self.dir, path)
    }

    fn children(&self, id: EntryId) -> Vec<EntryId> {
        self.index.entries[id.0].children.clone()
    }

    fn name(&self, id: EntryId) -> &str {
        &self.index.entries[id.0].name
    }

    fn is_dir(&self, id: EntryId) -> bool {
        self.index.entries[id.0].is_dir()
    }
}
