// src/filesystem/mod.rs

//! Filesystem model for package assembly
//!
//! This module provides:
//! - Scanning of search directories into flat, ordered path lists
//! - The per-package virtual tree that install rules fill and
//!   transformations mutate
//! - Ownership and mode values attached to tree nodes

pub mod metadata;
pub mod scan;
pub mod vfs;

pub use metadata::{Account, AccountKind, FileMode};
pub use scan::{ScanEntry, ScanKind, ScannedDir, scan_all, scan_dir};
pub use vfs::{NodeId, NodeKind, NodeMeta, PackageTree, Provenance, TreeError, TreeNode, TreeStats};
