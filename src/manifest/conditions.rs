// src/manifest/conditions.rs
//! `when:` clauses
//!
//! A condition is either a keyword string (`cross-compiling`) or a mapping
//! with exactly one key:
//!
//! ```yaml
//! when:
//!   all-of:
//!     - arch-matches: "linux-any"
//!     - not: cross-compiling
//! ```

use crate::condition::{ArchSpec, Condition, ConditionError, ProfileFormula};
use crate::error::{Error, Result};
use serde_yaml::Value;

/// Parse a `when:` value; `site` is where it was declared
pub fn parse_condition(value: &Value, site: &str) -> Result<Condition> {
    match value {
        Value::String(keyword) => match keyword.as_str() {
            "cross-compiling" => Ok(Condition::CrossCompiling),
            "can-execute-compiled-binaries" => Ok(Condition::CanExecuteCompiledBinaries),
            "run-build-time-tests" => Ok(Condition::RunBuildTimeTests),
            other => Err(Error::invalid_condition(
                site,
                format!("unknown condition \"{other}\""),
            )),
        },
        Value::Mapping(map) => {
            let mut entries = map.iter();
            let (Some((Value::String(key), operand)), None) = (entries.next(), entries.next())
            else {
                return Err(Error::invalid_condition(
                    site,
                    "a condition mapping must have exactly one key",
                ));
            };
            let inner_site = format!("{site}.{key}");
            let text = || {
                operand.as_str().ok_or_else(|| {
                    Error::invalid_condition(&inner_site, format!("\"{key}\" expects a string"))
                })
            };
            let attach = |e: ConditionError| e.at(&inner_site);

            match key.as_str() {
                "arch-matches" => Ok(Condition::ArchMatches(ArchSpec::parse(text()?).map_err(attach)?)),
                "source-context-arch-matches" => Ok(Condition::SourceContextArchMatches(
                    ArchSpec::parse(text()?).map_err(attach)?,
                )),
                "package-context-arch-matches" => Ok(Condition::PackageContextArchMatches(
                    ArchSpec::parse(text()?).map_err(attach)?,
                )),
                "build-profiles-matches" => Ok(Condition::BuildProfilesMatches(
                    ProfileFormula::parse(text()?).map_err(attach)?,
                )),
                "not" => Ok(Condition::not(parse_condition(operand, &inner_site)?)),
                "all-of" | "any-of" => {
                    let Value::Sequence(items) = operand else {
                        return Err(Error::invalid_condition(
                            &inner_site,
                            format!("\"{key}\" expects a list of conditions"),
                        ));
                    };
                    let conditions = items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| parse_condition(item, &format!("{inner_site}[{i}]")))
                        .collect::<Result<Vec<_>>>()?;
                    let combined = if key == "all-of" {
                        Condition::all_of(conditions)
                    } else {
                        Condition::any_of(conditions)
                    };
                    combined.map_err(attach)
                }
                other => Err(Error::invalid_condition(
                    site,
                    format!("unknown condition \"{other}\""),
                )),
            }
        }
        _ => Err(Error::invalid_condition(
            site,
            "a condition must be a keyword or a mapping",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{BuildContext, ConditionContext};

    fn parse(yaml: &str) -> Result<Condition> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        parse_condition(&value, "installations[0].install.when")
    }

    #[test]
    fn test_parse_and_evaluate() {
        let cond = parse("all-of:\n  - arch-matches: linux-any\n  - not: cross-compiling\n").unwrap();
        let build = BuildContext::new("amd64");
        assert!(cond.evaluate(&ConditionContext::source(&build)).unwrap());

        let cond = parse("build-profiles-matches: \"<!nocheck>\"").unwrap();
        assert!(cond.evaluate(&ConditionContext::source(&build)).unwrap());
        let nocheck = BuildContext::new("amd64").with_build_profiles(["nocheck"]);
        assert!(!cond.evaluate(&ConditionContext::source(&nocheck)).unwrap());
    }

    #[test]
    fn test_invalid_conditions() {
        for yaml in [
            "no-such-keyword",
            "any-of:\n  - cross-compiling\n",
            "arch-matches: 1",
            "{not: cross-compiling, arch-matches: amd64}",
            "build-profiles-matches: \"<a !b>\"",
        ] {
            let err = parse(yaml).unwrap_err();
            assert_eq!(err.code(), "invalid-condition", "{yaml}");
        }
    }
}
