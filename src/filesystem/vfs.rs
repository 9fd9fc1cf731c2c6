// src/filesystem/vfs.rs

//! Per-package virtual file tree with arena allocation and O(1) path lookup
//!
//! Each output package owns one [`PackageTree`]. Installation rules populate
//! it and transformations then mutate it in declaration order.
//!
//! # Design
//!
//! - **Arena Allocation**: Nodes live in a contiguous Vec and are referenced
//!   by `NodeId`. Removed subtrees are detached from their parent and the
//!   path index; their arena slots are simply never reachable again.
//!
//! - **O(1) Path Lookup**: A HashMap maps relative paths (`usr/bin/foo`, the
//!   root being the empty string) to node IDs.
//!
//! - **Deterministic Order**: Children are kept sorted by name so walks and
//!   pattern matches are stable across runs.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error as ThisError;

use super::metadata::Account;
use crate::error::Error;
use crate::matcher::PathTree;

/// Index into the arena for referencing nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the raw index value
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Structural errors raised by tree mutations
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("path already exists: {0}")]
    AlreadyExists(String),

    #[error("expected a directory at {0}")]
    NotADirectory(String),

    #[error("cannot replace the directory {0} with a non-directory")]
    IsADirectory(String),

    #[error("the root directory cannot be {0}")]
    Root(&'static str),

    #[error("cannot move {0} into its own subtree")]
    IntoOwnSubtree(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),
}

impl TreeError {
    /// Attach the declaration site of the rule that performed the mutation
    pub fn at(self, site: impl Into<String>) -> Error {
        let reason = self.to_string();
        match self {
            Self::AlreadyExists(path)
            | Self::NotADirectory(path)
            | Self::IsADirectory(path)
            | Self::NotFound(path) => Error::path_conflict(path, reason, site),
            Self::Root(_) | Self::IntoOwnSubtree(_) | Self::InvalidName(_) => {
                Error::invalid_rule(site, reason)
            }
        }
    }
}

/// Type of tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
    Symlink { target: String },
}

/// Where an installed path came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Search directory as configured
    pub search_dir: String,
    /// Path relative to the search directory
    pub path: String,
    /// Location on disk, used to read file content
    #[serde(skip)]
    pub fs_path: PathBuf,
}

/// Ownership and permissions of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    pub mode: u32,
    pub owner: Account,
    pub group: Account,
    pub capabilities: Option<String>,
}

impl NodeMeta {
    /// root:root with the given mode
    pub fn root_owned(mode: u32) -> Self {
        Self {
            mode,
            owner: Account::root(),
            group: Account::root(),
            capabilities: None,
        }
    }
}

/// A node in the package tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    meta: NodeMeta,
    source: Option<Provenance>,
    /// Created by a rule rather than implied as a parent
    explicit: bool,
}

impl TreeNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    #[inline]
    pub fn source(&self) -> Option<&Provenance> {
        self.source.as_ref()
    }

    #[inline]
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File)
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::Symlink { .. })
    }

    pub fn link_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink { target } => Some(target),
            _ => None,
        }
    }
}

/// Arena-allocated package tree
#[derive(Debug, Clone)]
pub struct PackageTree {
    nodes: Vec<TreeNode>,
    path_index: HashMap<String, NodeId>,
    root: NodeId,
}

impl Default for PackageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageTree {
    /// Create a tree holding only the root directory
    pub fn new() -> Self {
        let root_node = TreeNode {
            name: String::new(),
            kind: NodeKind::Directory,
            parent: None,
            children: Vec::new(),
            meta: NodeMeta::root_owned(0o755),
            source: None,
            explicit: false,
        };
        let root = NodeId(0);
        let mut path_index = HashMap::new();
        path_index.insert(String::new(), root);
        Self {
            nodes: vec![root_node],
            path_index,
            root,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of reachable nodes, root included
    #[inline]
    pub fn len(&self) -> usize {
        self.path_index.len()
    }

    /// True when only the root exists
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.path_index.len() == 1
    }

    /// # Panics
    ///
    /// Panics if the NodeId is out of bounds.
    #[inline]
    pub fn get_node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    #[inline]
    fn get_node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    /// Mutable access to ownership and permissions
    pub fn meta_mut(&mut self, id: NodeId) -> &mut NodeMeta {
        &mut self.get_node_mut(id).meta
    }

    /// Look up a node by relative path
    #[inline]
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.path_index.get(path.trim_matches('/')).copied()
    }

    #[inline]
    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Whether a node is still attached to the tree
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.path_index.get(&self.get_path(id)) == Some(&id)
    }

    /// Full relative path of a node
    pub fn get_path(&self, id: NodeId) -> String {
        let mut components = Vec::new();
        let mut current = id;
        while let Some(parent) = self.get_node(current).parent {
            components.push(self.get_node(current).name.as_str());
            current = parent;
        }
        components.reverse();
        components.join("/")
    }

    /// Create all missing directories up to and including `path`
    ///
    /// Directories created here are implicit: root:root 0755.
    pub fn mkdir_p(&mut self, path: &str) -> Result<NodeId, TreeError> {
        let mut current = self.root;
        let mut current_path = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(segment);

            current = match self.lookup(&current_path) {
                Some(id) if self.get_node(id).is_directory() => id,
                Some(_) => return Err(TreeError::NotADirectory(current_path)),
                None => self.attach(
                    current,
                    segment.to_string(),
                    NodeKind::Directory,
                    NodeMeta::root_owned(0o755),
                    None,
                    false,
                ),
            };
        }
        Ok(current)
    }

    /// Insert or replace a node at `path`, creating implicit parents
    ///
    /// A directory replaces an existing non-directory. A non-directory
    /// cannot replace a directory. Inserting a directory where one exists
    /// keeps the existing node and its children.
    pub fn insert(
        &mut self,
        path: &str,
        kind: NodeKind,
        meta: NodeMeta,
        source: Option<Provenance>,
    ) -> Result<NodeId, TreeError> {
        let path = path.trim_matches('/');
        let (parent_path, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path),
        };
        if name.is_empty() {
            return Err(TreeError::Root("replaced"));
        }
        if name == "." || name == ".." {
            return Err(TreeError::InvalidName(name.to_string()));
        }
        let parent = self.mkdir_p(parent_path)?;

        if let Some(existing) = self.lookup(path) {
            let existing_is_dir = self.get_node(existing).is_directory();
            match (existing_is_dir, kind == NodeKind::Directory) {
                (true, true) => {
                    let node = self.get_node_mut(existing);
                    node.meta = meta;
                    node.explicit = true;
                    if source.is_some() {
                        node.source = source;
                    }
                    return Ok(existing);
                }
                (true, false) => return Err(TreeError::IsADirectory(path.to_string())),
                _ => {
                    self.detach(existing);
                }
            }
        }

        Ok(self.attach(parent, name.to_string(), kind, meta, source, true))
    }

    /// Add a regular file
    pub fn add_file(
        &mut self,
        path: &str,
        meta: NodeMeta,
        source: Option<Provenance>,
    ) -> Result<NodeId, TreeError> {
        self.insert(path, NodeKind::File, meta, source)
    }

    /// Add a symlink; the target is stored verbatim
    pub fn add_symlink(&mut self, path: &str, target: &str) -> Result<NodeId, TreeError> {
        self.insert(
            path,
            NodeKind::Symlink {
                target: target.to_string(),
            },
            NodeMeta::root_owned(0o777),
            None,
        )
    }

    /// Remove a node and all its children; returns the number removed
    pub fn remove(&mut self, id: NodeId) -> Result<usize, TreeError> {
        if id == self.root {
            return Err(TreeError::Root("removed"));
        }
        Ok(self.detach(id))
    }

    /// Remove empty directories upwards starting at `dir`, stopping at root
    pub fn prune_empty_dirs(&mut self, dir: NodeId) -> usize {
        let mut removed = 0;
        let mut current = dir;
        while current != self.root {
            let node = self.get_node(current);
            if !node.is_directory() || !node.children.is_empty() {
                break;
            }
            let Some(parent) = node.parent else {
                break;
            };
            removed += self.detach(current);
            current = parent;
        }
        removed
    }

    /// Move a subtree below `new_parent` under `new_name`
    pub fn reparent_with_rename(
        &mut self,
        id: NodeId,
        new_parent: NodeId,
        new_name: &str,
    ) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::Root("moved"));
        }
        if new_name.is_empty() || new_name.contains('/') || new_name == "." || new_name == ".." {
            return Err(TreeError::InvalidName(new_name.to_string()));
        }
        if !self.get_node(new_parent).is_directory() {
            return Err(TreeError::NotADirectory(self.get_path(new_parent)));
        }
        if new_parent == id || self.is_descendant_of(new_parent, id) {
            return Err(TreeError::IntoOwnSubtree(self.get_path(id)));
        }
        let parent_path = self.get_path(new_parent);
        let new_path = join(&parent_path, new_name);
        if self.exists(&new_path) {
            return Err(TreeError::AlreadyExists(new_path));
        }

        let mut subtree = vec![id];
        self.collect_descendants(id, &mut subtree);
        for &node in &subtree {
            let old_path = self.get_path(node);
            self.path_index.remove(&old_path);
        }

        if let Some(old_parent) = self.get_node(id).parent {
            self.get_node_mut(old_parent).children.retain(|&c| c != id);
        }
        self.get_node_mut(id).name = new_name.to_string();
        self.get_node_mut(id).parent = Some(new_parent);
        self.insert_child_sorted(new_parent, id);

        for node in subtree {
            let path = self.get_path(node);
            self.path_index.insert(path, node);
        }
        Ok(())
    }

    /// Check if a node is a descendant of another node
    pub fn is_descendant_of(&self, potential_descendant: NodeId, ancestor: NodeId) -> bool {
        let mut current = potential_descendant;
        while let Some(parent_id) = self.get_node(current).parent {
            if parent_id == ancestor {
                return true;
            }
            current = parent_id;
        }
        false
    }

    /// All descendants in depth-first, name-sorted order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.collect_descendants(id, &mut result);
        result
    }

    fn collect_descendants(&self, id: NodeId, result: &mut Vec<NodeId>) {
        for &child_id in &self.get_node(id).children {
            result.push(child_id);
            self.collect_descendants(child_id, result);
        }
    }

    fn attach(
        &mut self,
        parent: NodeId,
        name: String,
        kind: NodeKind,
        meta: NodeMeta,
        source: Option<Provenance>,
        explicit: bool,
    ) -> NodeId {
        let path = join(&self.get_path(parent), &name);
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            name,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            meta,
            source,
            explicit,
        });
        self.insert_child_sorted(parent, id);
        self.path_index.insert(path, id);
        id
    }

    fn insert_child_sorted(&mut self, parent: NodeId, child: NodeId) {
        let name = self.nodes[child.0].name.clone();
        let nodes = &self.nodes;
        let pos = nodes[parent.0]
            .children
            .binary_search_by(|c| nodes[c.0].name.as_str().cmp(name.as_str()))
            .unwrap_or_else(|p| p);
        self.nodes[parent.0].children.insert(pos, child);
    }

    /// Unlink a subtree from its parent and the path index
    fn detach(&mut self, id: NodeId) -> usize {
        let mut subtree = vec![id];
        self.collect_descendants(id, &mut subtree);
        for &node in &subtree {
            let path = self.get_path(node);
            self.path_index.remove(&path);
        }
        if let Some(parent) = self.get_node(id).parent {
            self.get_node_mut(parent).children.retain(|&c| c != id);
        }
        subtree.len()
    }

    /// Walk the tree depth-first, calling the visitor for each node
    pub fn walk<F>(&self, mut visitor: F)
    where
        F: FnMut(NodeId, &TreeNode, &str),
    {
        self.walk_recursive(self.root, "", &mut visitor);
    }

    fn walk_recursive<F>(&self, id: NodeId, current_path: &str, visitor: &mut F)
    where
        F: FnMut(NodeId, &TreeNode, &str),
    {
        let node = self.get_node(id);
        visitor(id, node, current_path);
        for &child_id in &node.children {
            let child_path = join(current_path, &self.get_node(child_id).name);
            self.walk_recursive(child_id, &child_path, visitor);
        }
    }

    /// Get statistics about the tree
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        self.walk(|_, node, _| match node.kind {
            NodeKind::Directory => stats.directories += 1,
            NodeKind::File => stats.files += 1,
            NodeKind::Symlink { .. } => stats.symlinks += 1,
        });
        stats
    }
}

impl PathTree for PackageTree {
    type Id = NodeId;

    fn root(&self) -> NodeId {
        self.root
    }

    fn lookup(&self, path: &str) -> Option<NodeId> {
        PackageTree::lookup(self, path)
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get_node(id).children.clone()
    }

    fn name(&self, id: NodeId) -> &str {
        &self.get_node(id).name
    }

    fn is_dir(&self, id: NodeId) -> bool {
        self.get_node(id).is_directory()
    }
}

/// Statistics about a package tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
}

/// Join two relative path fragments
pub fn join(dir: &str, name: &str) -> String {
    match (dir.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{dir}/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_meta() -> NodeMeta {
        NodeMeta::root_owned(0o644)
    }

    #[test]
    fn test_new_tree_has_root() {
        let tree = PackageTree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.lookup(""), Some(tree.root()));
        assert_eq!(tree.get_path(tree.root()), "");
    }

    #[test]
    fn test_insert_creates_implicit_parents() {
        let mut tree = PackageTree::new();
        let id = tree.add_file("usr/bin/foo", file_meta(), None).unwrap();
        assert_eq!(tree.get_path(id), "usr/bin/foo");

        let bin = tree.lookup("usr/bin").unwrap();
        let node = tree.get_node(bin);
        assert!(node.is_directory());
        assert!(!node.is_explicit());
        assert_eq!(node.meta(), &NodeMeta::root_owned(0o755));
        assert!(tree.get_node(id).is_explicit());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_children_are_sorted() {
        let mut tree = PackageTree::new();
        tree.add_file("b", file_meta(), None).unwrap();
        tree.add_file("c", file_meta(), None).unwrap();
        tree.add_file("a", file_meta(), None).unwrap();
        let names: Vec<&str> = tree
            .get_node(tree.root())
            .children()
            .iter()
            .map(|&id| tree.get_node(id).name())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_replacement_rules() {
        let mut tree = PackageTree::new();
        tree.add_file("usr/share/foo", file_meta(), None).unwrap();
        tree.add_file("usr/share/bar/x", file_meta(), None).unwrap();

        // directory replaces a file
        let id = tree
            .insert("usr/share/foo", NodeKind::Directory, NodeMeta::root_owned(0o755), None)
            .unwrap();
        assert!(tree.get_node(id).is_directory());

        // file cannot replace a directory
        assert_eq!(
            tree.add_file("usr/share/bar", file_meta(), None),
            Err(TreeError::IsADirectory("usr/share/bar".to_string()))
        );

        // parent chain through a file fails
        tree.add_file("etc/foo", file_meta(), None).unwrap();
        assert_eq!(
            tree.add_file("etc/foo/bar", file_meta(), None),
            Err(TreeError::NotADirectory("etc/foo".to_string()))
        );
    }

    #[test]
    fn test_remove_and_prune() {
        let mut tree = PackageTree::new();
        tree.add_file("usr/share/doc/foo/README", file_meta(), None).unwrap();
        tree.add_file("usr/bin/foo", file_meta(), None).unwrap();

        let readme = tree.lookup("usr/share/doc/foo/README").unwrap();
        let parent = tree.get_node(readme).parent().unwrap();
        assert_eq!(tree.remove(readme).unwrap(), 1);
        assert!(!tree.exists("usr/share/doc/foo/README"));
        assert!(!tree.is_attached(readme));

        assert_eq!(tree.prune_empty_dirs(parent), 3);
        assert!(!tree.exists("usr/share"));
        assert!(tree.exists("usr/bin/foo"));

        assert_eq!(tree.remove(tree.root()), Err(TreeError::Root("removed")));
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = PackageTree::new();
        tree.add_file("opt/app/a", file_meta(), None).unwrap();
        tree.add_file("opt/app/sub/b", file_meta(), None).unwrap();
        let app = tree.lookup("opt/app").unwrap();
        assert_eq!(tree.remove(app).unwrap(), 4);
        assert!(!tree.exists("opt/app/sub/b"));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_reparent_with_rename() {
        let mut tree = PackageTree::new();
        tree.add_file("usr/lib/foo/a", file_meta(), None).unwrap();
        tree.add_file("usr/lib/foo/sub/b", file_meta(), None).unwrap();
        let share = tree.mkdir_p("usr/share").unwrap();
        let foo = tree.lookup("usr/lib/foo").unwrap();

        tree.reparent_with_rename(foo, share, "bar").unwrap();
        assert!(tree.exists("usr/share/bar/a"));
        assert!(tree.exists("usr/share/bar/sub/b"));
        assert!(!tree.exists("usr/lib/foo"));
        assert_eq!(tree.get_path(foo), "usr/share/bar");

        let sub = tree.lookup("usr/share/bar/sub").unwrap();
        assert_eq!(
            tree.reparent_with_rename(foo, sub, "x"),
            Err(TreeError::IntoOwnSubtree("usr/share/bar".to_string()))
        );
        let lib = tree.lookup("usr/lib").unwrap();
        tree.add_file("usr/lib/bar", file_meta(), None).unwrap();
        assert!(matches!(
            tree.reparent_with_rename(foo, lib, "bar"),
            Err(TreeError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_walk_and_stats() {
        let mut tree = PackageTree::new();
        tree.add_file("usr/bin/foo", file_meta(), None).unwrap();
        tree.add_symlink("usr/bin/bar", "foo").unwrap();
        let mut paths = Vec::new();
        tree.walk(|_, _, path| paths.push(path.to_string()));
        assert_eq!(paths, vec!["", "usr", "usr/bin", "usr/bin/bar", "usr/bin/foo"]);

        let stats = tree.stats();
        assert_eq!(stats.directories, 3);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.symlinks, 1);
        let bar = tree.lookup("usr/bin/bar").unwrap();
        assert_eq!(tree.get_node(bar).link_target(), Some("foo"));
    }

    #[test]
    fn test_tree_error_mapping() {
        let err = TreeError::NotADirectory("etc/foo".to_string()).at("site");
        assert_eq!(err.code(), "path-conflict");
        let err = TreeError::Root("removed").at("site");
        assert_eq!(err.code(), "invalid-rule");
    }
}
