// src/condition/profiles.rs
//! Build profile restriction formulas
//!
//! Syntax: `<nocheck> <!cross pkg.foo.bar>`. Groups are alternatives; every
//! entry inside a group must hold for the group to match.

use super::ConditionError;
use std::collections::BTreeSet;
use std::fmt;

/// One `<...>` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileGroup {
    pub profiles: Vec<String>,
    pub negated: bool,
}

impl ProfileGroup {
    fn matches(&self, active: &BTreeSet<String>) -> bool {
        self.profiles
            .iter()
            .all(|p| active.contains(p) != self.negated)
    }
}

/// Parsed restriction formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFormula {
    pub groups: Vec<ProfileGroup>,
}

impl ProfileFormula {
    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        let malformed = |reason: &str| ConditionError::Malformed {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = text.trim();
        if !trimmed.starts_with('<') || !trimmed.ends_with('>') {
            return Err(malformed("must start with \"<\" and end with \">\""));
        }

        let mut groups = Vec::new();
        let mut rest = trimmed;
        while !rest.is_empty() {
            let Some(body_start) = rest.strip_prefix('<') else {
                return Err(malformed("text between groups"));
            };
            let Some(end) = body_start.find('>') else {
                return Err(malformed("unterminated group"));
            };
            let body = &body_start[..end];
            if body.contains('<') {
                return Err(malformed("nested \"<\""));
            }
            groups.push(Self::parse_group(text, body)?);
            rest = body_start[end + 1..].trim_start();
        }

        Ok(Self { groups })
    }

    fn parse_group(text: &str, body: &str) -> Result<ProfileGroup, ConditionError> {
        let mut profiles = Vec::new();
        let mut negated = None;
        for token in body.split_whitespace() {
            let (is_negated, name) = match token.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            if name.is_empty() || name.contains('!') {
                return Err(ConditionError::Malformed {
                    text: text.to_string(),
                    reason: format!("invalid profile name \"{token}\""),
                });
            }
            match negated {
                None => negated = Some(is_negated),
                Some(previous) if previous != is_negated => {
                    return Err(ConditionError::MixedNegation(format!("<{}>", body.trim())));
                }
                Some(_) => {}
            }
            profiles.push(name.to_string());
        }
        if profiles.is_empty() {
            return Err(ConditionError::Malformed {
                text: text.to_string(),
                reason: "empty group \"<>\"".to_string(),
            });
        }
        Ok(ProfileGroup {
            profiles,
            negated: negated.unwrap_or(false),
        })
    }

    /// True when at least one group is satisfied by the active profiles
    pub fn matches(&self, active: &BTreeSet<String>) -> bool {
        self.groups.iter().any(|g| g.matches(active))
    }
}

impl fmt::Display for ProfileFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .groups
            .iter()
            .map(|g| {
                let prefix = if g.negated { "!" } else { "" };
                let entries: Vec<String> =
                    g.profiles.iter().map(|p| format!("{prefix}{p}")).collect();
                format!("<{}>", entries.join(" "))
            })
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}
