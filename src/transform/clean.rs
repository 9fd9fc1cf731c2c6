// src/transform/clean.rs
//! Clean-after-removal specifications
//!
//! These are not applied to the package tree. Each spec is validated when it
//! is declared and rendered into a `postrm` shell snippet that removes the
//! paths when the package is removed or purged.

use crate::error::{Error, Result};
use crate::matcher::{PathPattern, is_glob};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use strum_macros::{AsRefStr, Display, EnumString};

/// Directories where globs may appear directly
const GLOB_ANCHORS: &[&str] = &["var/log"];

/// Directories where exact names and anything in subdirectories is allowed
const EXACT_OR_SUBDIR_ANCHORS: &[&str] = &[
    "etc",
    "run",
    "var/lib",
    "var/cache",
    "var/backups",
    "var/spool",
    "usr/lib/modules",
    "lib/modules",
    "lib/udev",
    "usr/lib/udev",
    "usr/share/misc",
];

/// Maintainer script phase that performs the cleanup
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeleteOn {
    #[default]
    Purge,
    Removal,
}

impl DeleteOn {
    fn postrm_argument(self) -> &'static str {
        match self {
            Self::Purge => "purge",
            Self::Removal => "remove",
        }
    }
}

/// A validated `clean-after-removal` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CleanSpec {
    pub site: String,
    pub paths: Vec<String>,
    pub delete_on: DeleteOn,
    pub recursive: bool,
    pub ignore_non_empty_dir: bool,
    /// The rendered `postrm` fragment
    pub snippet: String,
}

impl CleanSpec {
    pub fn new(
        site: impl Into<String>,
        paths: Vec<String>,
        delete_on: DeleteOn,
        recursive: bool,
        ignore_non_empty_dir: bool,
    ) -> Result<Self> {
        let site = site.into();
        if paths.is_empty() {
            return Err(Error::invalid_rule(&site, "no paths given"));
        }
        if ignore_non_empty_dir {
            if recursive {
                return Err(Error::invalid_rule(
                    &site,
                    "\"recursive\" and \"ignore-non-empty-dir\" are mutually exclusive",
                ));
            }
            if let Some(path) = paths.iter().find(|p| !p.ends_with('/')) {
                return Err(Error::invalid_rule(
                    &site,
                    format!(
                        "with \"ignore-non-empty-dir\" every path must end with \"/\", but \"{path}\" does not"
                    ),
                ));
            }
        }

        let mut snippet = format!(
            "if [ \"$1\" = \"{}\" ]; then\n",
            delete_on.postrm_argument()
        );
        for path in &paths {
            check_anchor(path, &site)?;
            let escaped = shell_escape_pattern(path, &site)?;
            let command = if ignore_non_empty_dir {
                "rmdir --ignore-fail-on-non-empty"
            } else if recursive {
                "rm -fr"
            } else if path.ends_with('/') {
                "rmdir"
            } else {
                "rm -f"
            };
            // Infallible for String
            let _ = writeln!(snippet, "    {command} \"${{DPKG_ROOT}}\"{escaped}");
        }
        snippet.push_str("fi\n");

        Ok(Self {
            site,
            paths,
            delete_on,
            recursive,
            ignore_non_empty_dir,
            snippet,
        })
    }
}

/// Refuse patterns that are not confined to a known-safe directory
fn check_anchor(raw: &str, site: &str) -> Result<()> {
    let pattern = PathPattern::parse(raw)?;
    if pattern.is_match_anything() {
        return Err(Error::invalid_rule(
            site,
            format!("\"{raw}\" would remove everything; restrict the pattern considerably"),
        ));
    }
    let not_anchored = || {
        Error::invalid_rule(
            site,
            format!(
                "\"{raw}\" is not anchored in a specific directory; avoid glob characters in the top level directories"
            ),
        )
    };
    let mut dir = pattern.anchor_dir().ok_or_else(not_anchored)?.to_string();
    if dir.is_empty() {
        return Err(not_anchored());
    }

    let mut subdir_match = pattern.is_exact();
    let mut direct_match_only = false;
    while !dir.is_empty() {
        let is_subdir_anchor = EXACT_OR_SUBDIR_ANCHORS.contains(&dir.as_str());
        if (subdir_match && is_subdir_anchor) || GLOB_ANCHORS.contains(&dir.as_str()) {
            return Ok(());
        }
        if is_subdir_anchor {
            direct_match_only = true;
            break;
        }
        dir = dir.rsplit_once('/').map_or("", |(parent, _)| parent).to_string();
        subdir_match = true;
    }

    if direct_match_only {
        Err(Error::invalid_rule(
            site,
            format!("\"{raw}\" is overreaching; it would be allowed as an exact path instead of a glob"),
        ))
    } else {
        Err(Error::invalid_rule(
            site,
            format!("\"{raw}\" is not limited to a directory that is safe to clean"),
        ))
    }
}

/// Render an absolute shell word; glob characters stay unquoted
fn shell_escape_pattern(raw: &str, site: &str) -> Result<String> {
    let unsupported = || {
        Error::invalid_rule(
            site,
            format!(
                "\"{raw}\" cannot be used in a clean rule; rewrite it as a simple pattern such as var/log/foo/*.log"
            ),
        )
    };
    if raw.contains("**") {
        return Err(unsupported());
    }

    let mut out = String::new();
    for segment in raw.split('/').filter(|s| !s.is_empty() && *s != ".") {
        out.push('/');
        if !is_glob(segment) {
            out.push_str(&shell_quote(segment));
            continue;
        }
        for c in segment.chars() {
            match c {
                '*' | '?' | '[' | ']' | '!' => out.push(c),
                c if c.is_ascii_alphanumeric() || "._-+,@%:=".contains(c) => out.push(c),
                _ => return Err(unsupported()),
            }
        }
    }
    if raw.ends_with('/') {
        out.push('/');
    }
    Ok(out)
}

fn shell_quote(word: &str) -> String {
    if word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._-+,@%:=".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet() {
        let spec = CleanSpec::new(
            "packages.foo.clean-after-removal[0]",
            vec!["var/log/foo/*.log".to_string(), "var/lib/foo/".to_string()],
            DeleteOn::Purge,
            false,
            false,
        )
        .unwrap();
        assert_eq!(
            spec.snippet,
            "if [ \"$1\" = \"purge\" ]; then\n    rm -f \"${DPKG_ROOT}\"/var/log/foo/*.log\n    rmdir \"${DPKG_ROOT}\"/var/lib/foo/\nfi\n"
        );

        let spec = CleanSpec::new("s", vec!["var/cache/foo".to_string()], DeleteOn::Removal, true, false)
            .unwrap();
        assert!(spec.snippet.starts_with("if [ \"$1\" = \"remove\" ]"));
        assert!(spec.snippet.contains("rm -fr \"${DPKG_ROOT}\"/var/cache/foo\n"));
    }

    #[test]
    fn test_anchoring() {
        let ok = |p: &str| CleanSpec::new("s", vec![p.to_string()], DeleteOn::Purge, false, false);
        assert!(ok("etc/foo.conf").is_ok());
        assert!(ok("etc/foo/*").is_ok());
        assert!(ok("var/log/Xorg.*.log").is_ok());
        assert!(ok("var/lib/foo/cache/*").is_ok());

        let err = ok("etc/*").unwrap_err();
        assert!(err.to_string().contains("overreaching"), "{err}");
        assert_eq!(ok("usr/bin/foo").unwrap_err().code(), "invalid-rule");
        assert_eq!(ok("*").unwrap_err().code(), "invalid-rule");
        assert_eq!(ok("*/foo").unwrap_err().code(), "invalid-rule");
        assert_eq!(ok("var/log/**/*.log").unwrap_err().code(), "invalid-rule");
    }

    #[test]
    fn test_ignore_non_empty_dir() {
        let spec = CleanSpec::new("s", vec!["var/lib/foo/".to_string()], DeleteOn::Purge, false, true)
            .unwrap();
        assert!(spec.snippet.contains("rmdir --ignore-fail-on-non-empty \"${DPKG_ROOT}\"/var/lib/foo/"));

        assert!(CleanSpec::new("s", vec!["var/lib/foo".to_string()], DeleteOn::Purge, false, true).is_err());
        assert!(CleanSpec::new("s", vec!["var/lib/foo/".to_string()], DeleteOn::Purge, true, true).is_err());
    }
}
