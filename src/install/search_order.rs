// src/install/search_order.rs
//! Global search directory order
//!
//! Each package has its own ordered list of search directories. The lists
//! are merged into one order that respects every package's list; the
//! source root always comes last and applies to every package.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A search directory and the packages it is searched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSearchDir {
    pub path: String,
    pub applies_to: BTreeSet<String>,
}

struct Node {
    path: String,
    applies_to: BTreeSet<String>,
    after: BTreeSet<String>,
}

/// Merge per-package search directory lists
///
/// Packages without an entry in `requested` use `default_dirs`. Directories
/// are released in first-seen order once everything they must follow has
/// been released; a contradiction raises [`Error::SearchDirCycle`].
pub fn determine_search_dir_order(
    packages: &[String],
    requested: &BTreeMap<String, Vec<String>>,
    default_dirs: &[String],
    source_root: &str,
) -> Result<Vec<OrderedSearchDir>> {
    let mut nodes: Vec<Node> = Vec::new();

    for package in packages {
        let dirs = requested.get(package).map_or(default_dirs, Vec::as_slice);
        let mut previous: Option<&str> = None;
        for dir in dirs {
            if dir == source_root {
                debug!("{}: the source root is always searched last", package);
                continue;
            }
            let position = match nodes.iter().position(|n| &n.path == dir) {
                Some(position) => position,
                None => {
                    nodes.push(Node {
                        path: dir.clone(),
                        applies_to: BTreeSet::new(),
                        after: BTreeSet::new(),
                    });
                    nodes.len() - 1
                }
            };
            let node = &mut nodes[position];
            node.applies_to.insert(package.clone());
            if let Some(previous) = previous {
                node.after.insert(previous.to_string());
            }
            previous = Some(dir.as_str());
        }
    }

    let mut ordered = Vec::with_capacity(nodes.len() + 1);
    let mut released: BTreeSet<String> = BTreeSet::new();
    while !nodes.is_empty() {
        let Some(position) = nodes.iter().position(|n| n.after.is_subset(&released)) else {
            let names: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
            return Err(Error::SearchDirCycle(format!(
                "circular ordering between {}; the search directories of all packages must agree on their order",
                names.join(", ")
            )));
        };
        let node = nodes.remove(position);
        released.insert(node.path.clone());
        ordered.push(OrderedSearchDir {
            path: node.path,
            applies_to: node.applies_to,
        });
    }

    ordered.push(OrderedSearchDir {
        path: source_root.to_string(),
        applies_to: packages.iter().cloned().collect(),
    });
    Ok(ordered)
}
