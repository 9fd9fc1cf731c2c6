// src/manifest/substitution.rs
//! `{{VARIABLE}}` substitution in manifest strings
//!
//! Values come from:
//! 1. Built-in variables (`DEB_HOST_ARCH`, `DEB_HOST_MULTIARCH`, ...)
//! 2. `PACKAGE`, inside a package's own section
//! 3. Custom variables from `definitions.variables`
//!
//! Whether a source pattern is a glob is decided by the template text
//! outside `{{...}}`. A literal template stays an exact path whatever the
//! values contain; in a glob template the values are glob-escaped, so a
//! variable can never widen a pattern.

use crate::condition::{BuildContext, multiarch_triplet};
use crate::error::{Error, Result};
use crate::matcher::{PathPattern, escape_glob, is_glob};
use std::collections::BTreeMap;

const BUILTINS: &[&str] = &[
    "PACKAGE",
    "DEB_HOST_ARCH",
    "DEB_BUILD_ARCH",
    "DEB_HOST_MULTIARCH",
    "DEB_BUILD_MULTIARCH",
];

/// Variables visible at one place in the manifest
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    variables: BTreeMap<String, String>,
}

impl Substitution {
    /// Built-in and manifest-defined variables, without `PACKAGE`
    pub fn new(build: &BuildContext, custom: &BTreeMap<String, String>) -> Result<Self> {
        let mut variables = BTreeMap::new();
        variables.insert("DEB_HOST_ARCH".to_string(), build.host_arch().to_string());
        variables.insert("DEB_BUILD_ARCH".to_string(), build.build_arch().to_string());
        if let Some(triplet) = multiarch_triplet(build.host_arch()) {
            variables.insert("DEB_HOST_MULTIARCH".to_string(), triplet.to_string());
        }
        if let Some(triplet) = multiarch_triplet(build.build_arch()) {
            variables.insert("DEB_BUILD_MULTIARCH".to_string(), triplet.to_string());
        }

        for (name, value) in custom {
            let site = format!("definitions.variables.{name}");
            if BUILTINS.contains(&name.as_str()) || name.starts_with("DEB_") {
                return Err(Error::invalid_rule(
                    site,
                    format!("\"{name}\" is reserved and cannot be redefined"),
                ));
            }
            let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(Error::invalid_rule(site, format!("invalid variable name \"{name}\"")));
            }
            if value.contains("{{") {
                return Err(Error::invalid_rule(
                    site,
                    "variable values cannot reference other variables",
                ));
            }
            variables.insert(name.clone(), value.clone());
        }
        Ok(Self { variables })
    }

    /// The same variables plus `PACKAGE`
    pub fn for_package(&self, package: &str) -> Self {
        let mut variables = self.variables.clone();
        variables.insert("PACKAGE".to_string(), package.to_string());
        Self { variables }
    }

    /// Substitute into a literal value (destination, link target, name)
    pub fn substitute(&self, text: &str, site: &str) -> Result<String> {
        self.expand(text, site, false)
    }

    /// Substitute into a path pattern; values are glob-escaped
    pub fn substitute_pattern(&self, text: &str, site: &str) -> Result<String> {
        self.expand(text, site, true)
    }

    /// Substitute into a source pattern and parse it
    pub fn pattern(&self, text: &str, site: &str) -> Result<PathPattern> {
        if is_glob(&template_text(text)) {
            PathPattern::parse(&self.substitute_pattern(text, site)?)
        } else {
            PathPattern::literal(&self.substitute(text, site)?)
        }
    }

    fn expand(&self, text: &str, site: &str, escape: bool) -> Result<String> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(Error::invalid_rule(
                    site,
                    format!("unterminated variable reference in \"{text}\""),
                ));
            };
            let name = after[..end].trim();
            let value = self.variables.get(name).ok_or_else(|| {
                Error::invalid_rule(site, format!("unknown variable \"{name}\" in \"{text}\""))
            })?;
            if escape {
                result.push_str(&escape_glob(value));
            } else {
                result.push_str(value);
            }
            rest = &after[end + 2..];
        }
        result.push_str(rest);
        Ok(result)
    }
}

/// The template with every `{{...}}` reference removed
fn template_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        match rest[start + 2..].find("}}") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return result,
        }
    }
    result.push_str(rest);
    result
}
