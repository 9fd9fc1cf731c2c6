// src/condition/mod.rs
//! Build-time conditions gating manifest rules
//!
//! A [`BuildContext`] is created once per build and never mutated. Conditions
//! are evaluated against it, optionally narrowed to a single package's
//! resolved architecture through [`ConditionContext`].

pub mod arch;
pub mod profiles;

pub use arch::{ArchSpec, arch_matches_wildcard, multiarch_triplet};
pub use profiles::{ProfileFormula, ProfileGroup};

use crate::error::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error as ThisError;
use tracing::debug;

/// Problems found while parsing or evaluating a condition
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("malformed condition \"{text}\": {reason}")]
    Malformed { text: String, reason: String },

    #[error("negated and non-negated entries cannot be mixed in \"{0}\"")]
    MixedNegation(String),

    #[error("{0} requires at least two conditions")]
    TooFewOperands(&'static str),

    #[error("{0} cannot be used in the architecture independent package {1}")]
    ArchInIndependentPackage(&'static str, String),
}

impl ConditionError {
    /// Attach the declaration site of the owning rule
    pub fn at(self, site: impl Into<String>) -> Error {
        Error::invalid_condition(site, self.to_string())
    }
}

/// Immutable build facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    host_arch: String,
    build_arch: String,
    target_arch: Option<String>,
    build_profiles: BTreeSet<String>,
    build_options: BTreeMap<String, Option<String>>,
    cross_compiling: bool,
    run_tests: bool,
}

impl BuildContext {
    /// Native build for `host_arch` with no profiles or options
    pub fn new(host_arch: impl Into<String>) -> Self {
        let host_arch = host_arch.into();
        Self {
            build_arch: host_arch.clone(),
            host_arch,
            target_arch: None,
            build_profiles: BTreeSet::new(),
            build_options: BTreeMap::new(),
            cross_compiling: false,
            run_tests: true,
        }
    }

    /// Build a context from the dpkg-buildpackage environment variables
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let native = arch::native_arch().to_string();
        let host = var("DEB_HOST_ARCH").unwrap_or_else(|| native.clone());
        let build = var("DEB_BUILD_ARCH").unwrap_or(native);

        let mut context = Self::new(host).with_build_arch(build);
        if let Some(target) = var("DEB_TARGET_ARCH") {
            context = context.with_target_arch(target);
        }
        if let Some(options) = var("DEB_BUILD_OPTIONS") {
            context = context.with_build_options(&options);
        }
        if let Some(profiles) = var("DEB_BUILD_PROFILES") {
            context = context.with_build_profiles(profiles.split_whitespace());
        }
        debug!(
            "Build context: host={} build={} cross={} profiles={:?}",
            context.host_arch, context.build_arch, context.cross_compiling, context.build_profiles
        );
        context
    }

    /// Set the build architecture; cross compilation follows host != build
    pub fn with_build_arch(mut self, build_arch: impl Into<String>) -> Self {
        self.build_arch = build_arch.into();
        self.cross_compiling = self.build_arch != self.host_arch;
        self
    }

    pub fn with_target_arch(mut self, target_arch: impl Into<String>) -> Self {
        self.target_arch = Some(target_arch.into());
        self
    }

    pub fn with_build_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a `DEB_BUILD_OPTIONS` style string (`nocheck parallel=4`)
    pub fn with_build_options(mut self, options: &str) -> Self {
        self.build_options = options
            .split_whitespace()
            .map(|opt| match opt.split_once('=') {
                Some((k, v)) => (k.to_string(), Some(v.to_string())),
                None => (opt.to_string(), None),
            })
            .collect();
        self.run_tests = !self.build_options.contains_key("nocheck");
        self
    }

    /// Override the cross compilation flag
    pub fn with_cross_compiling(mut self, cross: bool) -> Self {
        self.cross_compiling = cross;
        self
    }

    /// Override the "run tests" flag
    pub fn with_run_tests(mut self, run_tests: bool) -> Self {
        self.run_tests = run_tests;
        self
    }

    pub fn host_arch(&self) -> &str {
        &self.host_arch
    }

    pub fn build_arch(&self) -> &str {
        &self.build_arch
    }

    pub fn target_arch(&self) -> Option<&str> {
        self.target_arch.as_deref()
    }

    pub fn build_profiles(&self) -> &BTreeSet<String> {
        &self.build_profiles
    }

    pub fn has_build_option(&self, name: &str) -> bool {
        self.build_options.contains_key(name)
    }

    pub fn build_option(&self, name: &str) -> Option<&str> {
        self.build_options.get(name).and_then(|v| v.as_deref())
    }

    pub fn is_cross_compiling(&self) -> bool {
        self.cross_compiling
    }

    pub fn run_tests(&self) -> bool {
        self.run_tests
    }

    /// Documentation is built unless `nodoc` (or the older `nodocs`) is set
    pub fn build_docs(&self) -> bool {
        !self.has_build_option("nodoc") && !self.has_build_option("nodocs")
    }

    pub fn can_execute_compiled_binaries(&self) -> bool {
        !self.cross_compiling || self.has_build_option("crossbuildcanrunhostbinaries")
    }
}

/// Resolved architecture of a binary package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageArch {
    /// `Architecture: all`
    Independent,
    /// Concrete architecture the package is built for
    Concrete(String),
}

/// Evaluation scope: the build plus, optionally, the package being processed
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub build: &'a BuildContext,
    pub package: Option<(&'a str, &'a PackageArch)>,
}

impl<'a> ConditionContext<'a> {
    pub fn source(build: &'a BuildContext) -> Self {
        Self {
            build,
            package: None,
        }
    }

    pub fn package(build: &'a BuildContext, name: &'a str, arch: &'a PackageArch) -> Self {
        Self {
            build,
            package: Some((name, arch)),
        }
    }
}

/// Condition expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    ArchMatches(ArchSpec),
    SourceContextArchMatches(ArchSpec),
    PackageContextArchMatches(ArchSpec),
    BuildProfilesMatches(ProfileFormula),
    CanExecuteCompiledBinaries,
    CrossCompiling,
    RunBuildTimeTests,
    Not(Box<Condition>),
    AllOf(Vec<Condition>),
    AnyOf(Vec<Condition>),
}

impl Condition {
    pub fn all_of(conditions: Vec<Condition>) -> Result<Self, ConditionError> {
        if conditions.len() < 2 {
            return Err(ConditionError::TooFewOperands("all-of"));
        }
        Ok(Self::AllOf(conditions))
    }

    pub fn any_of(conditions: Vec<Condition>) -> Result<Self, ConditionError> {
        if conditions.len() < 2 {
            return Err(ConditionError::TooFewOperands("any-of"));
        }
        Ok(Self::AnyOf(conditions))
    }

    pub fn not(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Reject conditions that can never be evaluated in the given package
    ///
    /// Run once when the manifest is loaded so the error surfaces even when
    /// an enclosing `any-of` would short-circuit past the offending leaf.
    pub fn validate(&self, package: Option<(&str, &PackageArch)>) -> Result<(), ConditionError> {
        match self {
            Self::ArchMatches(_) | Self::PackageContextArchMatches(_) => match package {
                Some((name, PackageArch::Independent)) => Err(
                    ConditionError::ArchInIndependentPackage(self.keyword(), name.to_string()),
                ),
                _ => Ok(()),
            },
            Self::AllOf(conditions) | Self::AnyOf(conditions) => {
                if conditions.len() < 2 {
                    return Err(ConditionError::TooFewOperands(self.keyword()));
                }
                conditions.iter().try_for_each(|c| c.validate(package))
            }
            Self::Not(inner) => inner.validate(package),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionError> {
        let build = ctx.build;
        let result = match self {
            Self::ArchMatches(spec) => match ctx.package {
                Some((name, PackageArch::Independent)) => {
                    return Err(ConditionError::ArchInIndependentPackage(
                        self.keyword(),
                        name.to_string(),
                    ));
                }
                Some((_, PackageArch::Concrete(arch))) => spec.matches(arch),
                None => spec.matches(build.host_arch()),
            },
            Self::SourceContextArchMatches(spec) => spec.matches(build.host_arch()),
            Self::PackageContextArchMatches(spec) => match ctx.package {
                Some((name, PackageArch::Independent)) => {
                    return Err(ConditionError::ArchInIndependentPackage(
                        self.keyword(),
                        name.to_string(),
                    ));
                }
                Some((_, PackageArch::Concrete(arch))) => spec.matches(arch),
                None => spec.matches(build.host_arch()),
            },
            Self::BuildProfilesMatches(formula) => formula.matches(build.build_profiles()),
            Self::CanExecuteCompiledBinaries => build.can_execute_compiled_binaries(),
            Self::CrossCompiling => build.is_cross_compiling(),
            Self::RunBuildTimeTests => build.run_tests(),
            Self::Not(inner) => !inner.evaluate(ctx)?,
            Self::AllOf(conditions) => {
                for c in conditions {
                    if !c.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                true
            }
            Self::AnyOf(conditions) => {
                for c in conditions {
                    if c.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                false
            }
        };
        Ok(result)
    }

    /// Manifest keyword for this condition
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::ArchMatches(_) => "arch-matches",
            Self::SourceContextArchMatches(_) => "source-context-arch-matches",
            Self::PackageContextArchMatches(_) => "package-context-arch-matches",
            Self::BuildProfilesMatches(_) => "build-profiles-matches",
            Self::CanExecuteCompiledBinaries => "can-execute-compiled-binaries",
            Self::CrossCompiling => "cross-compiling",
            Self::RunBuildTimeTests => "run-build-time-tests",
            Self::Not(_) => "not",
            Self::AllOf(_) => "all-of",
            Self::AnyOf(_) => "any-of",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchMatches(spec)
            | Self::SourceContextArchMatches(spec)
            | Self::PackageContextArchMatches(spec) => {
                write!(f, "{}: {}", self.keyword(), spec)
            }
            Self::BuildProfilesMatches(formula) => write!(f, "{}: {}", self.keyword(), formula),
            Self::Not(inner) => write!(f, "not({inner})"),
            Self::AllOf(conditions) | Self::AnyOf(conditions) => {
                let inner: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                write!(f, "{}({})", self.keyword(), inner.join(", "))
            }
            _ => f.write_str(self.keyword()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(text: &str) -> ArchSpec {
        ArchSpec::parse(text).unwrap()
    }

    #[test]
    fn test_build_context_defaults() {
        let ctx = BuildContext::new("amd64");
        assert!(!ctx.is_cross_compiling());
        assert!(ctx.run_tests());
        assert!(ctx.build_docs());
        assert!(ctx.can_execute_compiled_binaries());
    }

    #[test]
    fn test_build_context_options() {
        let ctx = BuildContext::new("arm64")
            .with_build_arch("amd64")
            .with_build_options("nocheck parallel=4 nodoc");
        assert!(ctx.is_cross_compiling());
        assert!(!ctx.run_tests());
        assert!(!ctx.build_docs());
        assert_eq!(ctx.build_option("parallel"), Some("4"));
        assert!(!ctx.can_execute_compiled_binaries());

        let ctx = ctx.with_build_options("crossbuildcanrunhostbinaries");
        assert!(ctx.can_execute_compiled_binaries());
        assert!(ctx.run_tests());
    }

    #[test]
    fn test_arch_matches_delegation() {
        let build = BuildContext::new("amd64");
        let cond = Condition::ArchMatches(arch("arm64"));

        let source = ConditionContext::source(&build);
        assert!(!cond.evaluate(&source).unwrap());

        let pkg_arch = PackageArch::Concrete("arm64".to_string());
        let pkg = ConditionContext::package(&build, "foo", &pkg_arch);
        assert!(cond.evaluate(&pkg).unwrap());

        let source_only = Condition::SourceContextArchMatches(arch("arm64"));
        assert!(!source_only.evaluate(&pkg).unwrap());
    }

    #[test]
    fn test_arch_matches_in_arch_all_package_is_error() {
        let build = BuildContext::new("amd64");
        let cond = Condition::not(Condition::ArchMatches(arch("amd64")));
        let indep = PackageArch::Independent;
        assert!(matches!(
            cond.validate(Some(("foo-data", &indep))),
            Err(ConditionError::ArchInIndependentPackage(..))
        ));
        let ctx = ConditionContext::package(&build, "foo-data", &indep);
        assert!(cond.evaluate(&ctx).is_err());

        let ok = Condition::SourceContextArchMatches(arch("amd64"));
        assert!(ok.validate(Some(("foo-data", &indep))).is_ok());
        assert!(ok.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_combinators() {
        let build = BuildContext::new("amd64").with_build_profiles(["nocheck"]);
        let ctx = ConditionContext::source(&build);

        let profiles = Condition::BuildProfilesMatches(ProfileFormula::parse("<nocheck>").unwrap());
        let all = Condition::all_of(vec![profiles.clone(), Condition::not(Condition::CrossCompiling)])
            .unwrap();
        assert!(all.evaluate(&ctx).unwrap());

        let any = Condition::any_of(vec![Condition::CrossCompiling, Condition::not(profiles)])
            .unwrap();
        assert!(!any.evaluate(&ctx).unwrap());

        assert!(Condition::all_of(vec![Condition::CrossCompiling]).is_err());
        assert!(Condition::any_of(Vec::new()).is_err());
    }

    #[test]
    fn test_display() {
        let cond = Condition::all_of(vec![
            Condition::ArchMatches(arch("linux-any")),
            Condition::not(Condition::RunBuildTimeTests),
        ])
        .unwrap();
        assert_eq!(
            cond.to_string(),
            "all-of(arch-matches: linux-any, not(run-build-time-tests))"
        );
    }

    #[test]
    fn test_condition_error_site() {
        let err = ConditionError::TooFewOperands("any-of").at("installations[0].install");
        assert_eq!(err.code(), "invalid-condition");
        assert_eq!(err.site(), Some("installations[0].install"));
    }
}
