// src/matcher/mod.rs
//! Path pattern classification and matching
//!
//! Patterns are classified syntactically:
//!
//! - exact: no glob metacharacter (`usr/bin/foo`)
//! - path-glob: a metacharacter and a `/` (`usr/lib/*.so`, `usr/share/*`)
//! - basename-glob: a metacharacter without `/`, or a `**/` prefix (`*.pyc`)
//!
//! `*` never crosses `/` but does match names starting with `.`. A glob never
//! matches the directory that contains its matches, and never the root.
//! Matching walks any tree implementing [`PathTree`] and never descends
//! through symlinks (trees only give children to directories).

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::fmt;

/// Read-only view of a path hierarchy that patterns can be matched against
pub trait PathTree {
    type Id: Copy + Eq;

    fn root(&self) -> Self::Id;
    fn lookup(&self, path: &str) -> Option<Self::Id>;
    /// Children sorted by name
    fn children(&self, id: Self::Id) -> Vec<Self::Id>;
    fn name(&self, id: Self::Id) -> &str;
    fn is_dir(&self, id: Self::Id) -> bool;
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Syntactic pattern class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Exact,
    PathGlob,
    BasenameGlob,
}

#[derive(Debug, Clone)]
enum MatchRule {
    /// Every top-level entry
    Anything,
    Exact(String),
    /// `dir/*`
    DirectChildren(String),
    /// Glob on the basename, below `dir` (or anywhere when `dir` is empty)
    BasenameGlob {
        dir: String,
        glob: Pattern,
        recursive: bool,
    },
    /// One glob per path segment
    Segments(Vec<Pattern>),
}

/// A parsed source pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    rule: MatchRule,
    dirs_only: bool,
}

/// Strip `./` and `/` prefixes and collapse duplicate separators
pub fn normalize_relative(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a string contains glob metacharacters
pub fn is_glob(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Escape a literal value so it can be embedded into a pattern
pub fn escape_glob(text: &str) -> String {
    Pattern::escape(text)
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty pattern"));
        }
        let dirs_only = trimmed.len() > 1 && trimmed.ends_with('/');
        let normalized = normalize_relative(trimmed);

        if normalized.split('/').any(|seg| seg == "..") {
            return Err(invalid("\"..\" is not allowed"));
        }

        let rule = if normalized.is_empty() || normalized == "*" || normalized == "**/*" {
            MatchRule::Anything
        } else if !is_glob(&normalized) {
            MatchRule::Exact(normalized.clone())
        } else {
            if normalized.contains('{') && normalized.contains('}') && normalized.contains(',') {
                return Err(invalid("brace expansion is not supported"));
            }
            Self::classify_glob(raw, &normalized)?
        };

        Ok(Self {
            raw: raw.to_string(),
            rule,
            dirs_only,
        })
    }

    /// A path taken literally, even if it contains glob metacharacters
    pub fn literal(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let normalized = normalize_relative(trimmed);
        if normalized.is_empty() {
            return Err(invalid("empty path"));
        }
        if normalized.split('/').any(|seg| seg == "..") {
            return Err(invalid("\"..\" is not allowed"));
        }

        Ok(Self {
            raw: raw.to_string(),
            rule: MatchRule::Exact(normalized),
            dirs_only: trimmed.ends_with('/'),
        })
    }

    fn classify_glob(raw: &str, normalized: &str) -> Result<MatchRule> {
        let compile = |text: &str| {
            Pattern::new(text).map_err(|e| Error::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.msg.to_string(),
            })
        };
        let invalid_recursive = || Error::InvalidPattern {
            pattern: raw.to_string(),
            reason: "\"**\" is only supported as a \"**/\" directory prefix".to_string(),
        };

        let segments: Vec<&str> = normalized.split('/').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(invalid_recursive)?;
        if last.contains("**") {
            return Err(invalid_recursive());
        }

        // "name-glob" or "**/name-glob": match anywhere
        if parents.is_empty() || parents == ["**"] {
            return Ok(MatchRule::BasenameGlob {
                dir: String::new(),
                glob: compile(last)?,
                recursive: true,
            });
        }

        let (literal_parents, recursive) = match parents.split_last() {
            Some((&"**", rest)) => (rest, true),
            _ => (parents, false),
        };
        let literal_dir = literal_parents
            .iter()
            .all(|seg| !is_glob(seg) && !seg.contains("**"));

        if literal_dir {
            let dir = literal_parents.join("/");
            if !recursive && *last == "*" {
                return Ok(MatchRule::DirectChildren(dir));
            }
            return Ok(MatchRule::BasenameGlob {
                dir,
                glob: compile(last)?,
                recursive,
            });
        }

        if segments.iter().any(|seg| seg.contains("**")) {
            return Err(invalid_recursive());
        }
        let compiled = segments
            .iter()
            .map(|seg| compile(seg))
            .collect::<Result<Vec<_>>>()?;
        Ok(MatchRule::Segments(compiled))
    }

    /// The pattern exactly as written in the manifest
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        match &self.rule {
            MatchRule::Exact(_) => PatternKind::Exact,
            MatchRule::Anything => PatternKind::BasenameGlob,
            MatchRule::BasenameGlob { dir, .. } if dir.is_empty() => PatternKind::BasenameGlob,
            MatchRule::BasenameGlob { .. } | MatchRule::DirectChildren(_) | MatchRule::Segments(_) => {
                PatternKind::PathGlob
            }
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self.rule, MatchRule::Exact(_))
    }

    /// Selects every top-level entry (`*`, `**/*`, `.`, `/`)
    pub fn is_match_anything(&self) -> bool {
        matches!(self.rule, MatchRule::Anything)
    }

    /// A trailing `/` restricts matches to directories
    pub fn dirs_only(&self) -> bool {
        self.dirs_only
    }

    /// Normalized path of an exact pattern
    pub fn exact_path(&self) -> Option<&str> {
        match &self.rule {
            MatchRule::Exact(path) => Some(path),
            _ => None,
        }
    }

    /// Literal directory the pattern is anchored beneath, if any
    pub fn anchor_dir(&self) -> Option<&str> {
        match &self.rule {
            MatchRule::Exact(path) => Some(path.rsplit_once('/').map_or("", |(d, _)| d)),
            MatchRule::DirectChildren(dir) => Some(dir),
            MatchRule::BasenameGlob { dir, .. } => Some(dir),
            MatchRule::Anything | MatchRule::Segments(_) => None,
        }
    }

    /// Check a single normalized path against the pattern
    pub fn matches_path(&self, path: &str) -> bool {
        let path = normalize_relative(path);
        if path.is_empty() {
            return false;
        }
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
        match &self.rule {
            MatchRule::Anything => !path.contains('/'),
            MatchRule::Exact(exact) => *exact == path,
            MatchRule::DirectChildren(parent) => dir == parent,
            MatchRule::BasenameGlob {
                dir: anchor,
                glob,
                recursive,
            } => {
                let in_scope = if *recursive {
                    anchor.is_empty() || dir == anchor || dir.starts_with(&format!("{anchor}/"))
                } else {
                    dir == anchor
                };
                in_scope && glob.matches_with(name, MATCH_OPTIONS)
            }
            MatchRule::Segments(globs) => {
                let parts: Vec<&str> = path.split('/').collect();
                parts.len() == globs.len()
                    && parts
                        .iter()
                        .zip(globs)
                        .all(|(part, glob)| glob.matches_with(part, MATCH_OPTIONS))
            }
        }
    }

    /// Find every entry of `tree` matched by this pattern, in tree order
    pub fn find_matches<T: PathTree>(&self, tree: &T) -> Vec<T::Id> {
        let mut found = match &self.rule {
            MatchRule::Anything => tree.children(tree.root()),
            MatchRule::Exact(path) => tree.lookup(path).into_iter().collect(),
            MatchRule::DirectChildren(dir) => match lookup_dir(tree, dir) {
                Some(id) => tree.children(id),
                None => Vec::new(),
            },
            MatchRule::BasenameGlob {
                dir,
                glob,
                recursive,
            } => {
                let mut found = Vec::new();
                if let Some(start) = lookup_dir(tree, dir) {
                    collect_by_name(tree, start, glob, *recursive, &mut found);
                }
                found
            }
            MatchRule::Segments(globs) => {
                let mut current = vec![tree.root()];
                for glob in globs {
                    current = current
                        .into_iter()
                        .flat_map(|id| tree.children(id))
                        .filter(|&child| glob.matches_with(tree.name(child), MATCH_OPTIONS))
                        .collect();
                }
                current
            }
        };
        if self.dirs_only {
            found.retain(|&id| tree.is_dir(id));
        }
        found.retain(|&id| id != tree.root());
        found
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn lookup_dir<T: PathTree>(tree: &T, dir: &str) -> Option<T::Id> {
    let id = if dir.is_empty() {
        tree.root()
    } else {
        tree.lookup(dir)?
    };
    tree.is_dir(id).then_some(id)
}

fn collect_by_name<T: PathTree>(
    tree: &T,
    dir: T::Id,
    glob: &Pattern,
    recursive: bool,
    found: &mut Vec<T::Id>,
) {
    for child in tree.children(dir) {
        if glob.matches_with(tree.name(child), MATCH_OPTIONS) {
            found.push(child);
        }
        if recursive && tree.is_dir(child) {
            collect_by_name(tree, child, glob, recursive, found);
        }
    }
}
