// src/condition/arch.rs
//! Debian architecture names and wildcard matching
//!
//! Architecture names decompose into an `abi-libc-os-cpu` tuple. Wildcards
//! such as `linux-any` or `any-amd64` are matched component-wise against the
//! tuple, with `any` matching every value.

use super::ConditionError;
use std::fmt;

/// Decomposed architecture tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchTuple {
    pub abi: &'static str,
    pub libc: &'static str,
    pub os: &'static str,
    pub cpu: &'static str,
}

struct KnownArch {
    name: &'static str,
    tuple: ArchTuple,
    multiarch: &'static str,
}

const fn arch(
    name: &'static str,
    abi: &'static str,
    libc: &'static str,
    os: &'static str,
    cpu: &'static str,
    multiarch: &'static str,
) -> KnownArch {
    KnownArch {
        name,
        tuple: ArchTuple { abi, libc, os, cpu },
        multiarch,
    }
}

const KNOWN_ARCHITECTURES: &[KnownArch] = &[
    arch("amd64", "base", "gnu", "linux", "amd64", "x86_64-linux-gnu"),
    arch("arm64", "base", "gnu", "linux", "arm64", "aarch64-linux-gnu"),
    arch("armel", "eabi", "gnu", "linux", "arm", "arm-linux-gnueabi"),
    arch("armhf", "eabihf", "gnu", "linux", "arm", "arm-linux-gnueabihf"),
    arch("i386", "base", "gnu", "linux", "i386", "i386-linux-gnu"),
    arch("mips64el", "abi64", "gnu", "linux", "mips64el", "mips64el-linux-gnuabi64"),
    arch("mipsel", "base", "gnu", "linux", "mipsel", "mipsel-linux-gnu"),
    arch("ppc64el", "base", "gnu", "linux", "ppc64el", "powerpc64le-linux-gnu"),
    arch("ppc64", "base", "gnu", "linux", "ppc64", "powerpc64-linux-gnu"),
    arch("powerpc", "base", "gnu", "linux", "powerpc", "powerpc-linux-gnu"),
    arch("s390x", "base", "gnu", "linux", "s390x", "s390x-linux-gnu"),
    arch("riscv64", "base", "gnu", "linux", "riscv64", "riscv64-linux-gnu"),
    arch("loong64", "base", "gnu", "linux", "loong64", "loongarch64-linux-gnu"),
    arch("sparc64", "base", "gnu", "linux", "sparc64", "sparc64-linux-gnu"),
    arch("alpha", "base", "gnu", "linux", "alpha", "alpha-linux-gnu"),
    arch("hppa", "base", "gnu", "linux", "hppa", "hppa-linux-gnu"),
    arch("m68k", "base", "gnu", "linux", "m68k", "m68k-linux-gnu"),
    arch("sh4", "base", "gnu", "linux", "sh4", "sh4-linux-gnu"),
    arch("ia64", "base", "gnu", "linux", "ia64", "ia64-linux-gnu"),
    arch("x32", "x32", "gnu", "linux", "amd64", "x86_64-linux-gnux32"),
    arch("hurd-i386", "base", "gnu", "hurd", "i386", "i386-gnu"),
    arch("hurd-amd64", "base", "gnu", "hurd", "amd64", "x86_64-gnu"),
    arch("kfreebsd-amd64", "base", "gnu", "kfreebsd", "amd64", "x86_64-kfreebsd-gnu"),
    arch("kfreebsd-i386", "base", "gnu", "kfreebsd", "i386", "i386-kfreebsd-gnu"),
    arch("musl-linux-amd64", "base", "musl", "linux", "amd64", "x86_64-linux-musl"),
    arch("musl-linux-arm64", "base", "musl", "linux", "arm64", "aarch64-linux-musl"),
];

fn lookup(name: &str) -> Option<&'static KnownArch> {
    KNOWN_ARCHITECTURES.iter().find(|a| a.name == name)
}

/// Decompose an architecture name into its tuple
pub fn arch_tuple(name: &str) -> Option<ArchTuple> {
    lookup(name).map(|a| a.tuple)
}

/// Multiarch triplet for an architecture (`amd64` -> `x86_64-linux-gnu`)
pub fn multiarch_triplet(name: &str) -> Option<&'static str> {
    lookup(name).map(|a| a.multiarch)
}

/// Map the architecture this binary was compiled for to a Debian name
pub fn native_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "i386",
        "arm" => "armhf",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64el",
        "powerpc64" => "ppc64",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Check a single architecture against a dpkg-style wildcard
///
/// `any` matches everything except `all`; `all` only matches itself.
pub fn arch_matches_wildcard(arch: &str, wildcard: &str) -> bool {
    if arch == wildcard {
        return true;
    }
    if arch == "all" || wildcard == "all" {
        return false;
    }
    if wildcard == "any" {
        return true;
    }

    let parts: Vec<&str> = wildcard.split('-').collect();
    if !parts.contains(&"any") {
        return false;
    }
    let wanted: [&str; 4] = match parts.as_slice() {
        [os, cpu] => ["any", "any", os, cpu],
        [libc, os, cpu] => ["any", libc, os, cpu],
        [abi, libc, os, cpu] => [abi, libc, os, cpu],
        _ => return false,
    };

    let Some(tuple) = arch_tuple(arch) else {
        return false;
    };
    let actual = [tuple.abi, tuple.libc, tuple.os, tuple.cpu];
    wanted
        .iter()
        .zip(actual.iter())
        .all(|(w, a)| *w == "any" || w == a)
}

/// Space separated architecture restriction list (`amd64 linux-any` or `!i386 !armel`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchSpec {
    pub architectures: Vec<String>,
    pub negated: bool,
}

impl ArchSpec {
    /// Parse a restriction list; negated and plain entries cannot be mixed
    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        let mut architectures = Vec::new();
        let mut negated = None;

        for token in text.split_whitespace() {
            let (is_negated, name) = match token.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            if name.is_empty() {
                return Err(ConditionError::Malformed {
                    text: text.to_string(),
                    reason: "empty architecture after \"!\"".to_string(),
                });
            }
            match negated {
                None => negated = Some(is_negated),
                Some(previous) if previous != is_negated => {
                    return Err(ConditionError::MixedNegation(text.to_string()));
                }
                Some(_) => {}
            }
            architectures.push(name.to_string());
        }

        if architectures.is_empty() {
            return Err(ConditionError::Malformed {
                text: text.to_string(),
                reason: "no architectures listed".to_string(),
            });
        }

        Ok(Self {
            architectures,
            negated: negated.unwrap_or(false),
        })
    }

    /// Check if this spec includes the given architecture
    pub fn matches(&self, arch: &str) -> bool {
        let hit = self
            .architectures
            .iter()
            .any(|wildcard| arch_matches_wildcard(arch, wildcard));
        hit != self.negated
    }
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.negated { "!" } else { "" };
        let rendered: Vec<String> = self
            .architectures
            .iter()
            .map(|a| format!("{prefix}{a}"))
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        assert!(arch_matches_wildcard("amd64", "amd64"));
        assert!(arch_matches_wildcard("amd64", "any"));
        assert!(arch_matches_wildcard("amd64", "linux-any"));
        assert!(arch_matches_wildcard("amd64", "any-amd64"));
        assert!(arch_matches_wildcard("x32", "any-amd64"));
        assert!(arch_matches_wildcard("armhf", "any-arm"));
        assert!(arch_matches_wildcard("hurd-i386", "hurd-any"));
        assert!(arch_matches_wildcard("musl-linux-amd64", "musl-linux-any"));
        assert!(!arch_matches_wildcard("musl-linux-amd64", "gnu-linux-any"));
        assert!(!arch_matches_wildcard("hurd-i386", "linux-any"));
        assert!(!arch_matches_wildcard("arm64", "any-amd64"));
        assert!(!arch_matches_wildcard("all", "any"));
        assert!(arch_matches_wildcard("all", "all"));
        assert!(!arch_matches_wildcard("amd64", "i386"));
    }

    #[test]
    fn test_arch_spec_parse_and_match() {
        let spec = ArchSpec::parse("amd64 linux-any").unwrap();
        assert!(!spec.negated);
        assert!(spec.matches("arm64"));
        assert!(!spec.matches("hurd-i386"));

        let spec = ArchSpec::parse("!i386 !armel").unwrap();
        assert!(spec.negated);
        assert!(spec.matches("amd64"));
        assert!(!spec.matches("i386"));
        assert_eq!(spec.to_string(), "!i386 !armel");
    }

    #[test]
    fn test_arch_spec_rejects_mixed_and_empty() {
        assert!(matches!(
            ArchSpec::parse("amd64 !i386"),
            Err(ConditionError::MixedNegation(_))
        ));
        assert!(ArchSpec::parse("   ").is_err());
        assert!(ArchSpec::parse("!").is_err());
    }

    #[test]
    fn test_multiarch_triplet() {
        assert_eq!(multiarch_triplet("amd64"), Some("x86_64-linux-gnu"));
        assert_eq!(multiarch_triplet("armhf"), Some("arm-linux-gnueabihf"));
        assert_eq!(multiarch_triplet("nonexistent"), None);
    }
}
