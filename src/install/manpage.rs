// src/install/manpage.rs
//! Man page destination computation for `install-man`

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static TH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[.]TH\s+\S+\s+"?(\d+[^"\s]*)"?"#).expect("valid regex"));
static DT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[.]Dt\s+\S+\s+(\d+\S*)").expect("valid regex"));
static SECTION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.]([1-9]\w*)(?:[.]gz)?$").expect("valid regex"));
static LANG_FROM_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)man/(?:([a-z][a-z](?:_[A-Z][A-Z])?)(?:\.[^/]+)?)?/man[1-9]/")
        .expect("valid regex")
});
static LANG_FROM_BASENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.]([a-z][a-z](?:_[A-Z][A-Z])?)[.](?:[1-9]|man)").expect("valid regex")
});

/// How the language of a man page is determined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManLanguage {
    /// `foo.de.1` is German
    DeriveFromBasename,
    /// `man/de/man1/foo.1` is German
    DeriveFromPath,
    /// Untranslated (`C`)
    Untranslated,
    Explicit(String),
}

impl ManLanguage {
    pub fn parse(text: &str) -> Self {
        match text {
            "derive-from-basename" => Self::DeriveFromBasename,
            "derive-from-path" => Self::DeriveFromPath,
            "C" => Self::Untranslated,
            other => Self::Explicit(other.to_string()),
        }
    }

    fn resolve(this: Option<&Self>, path: &str, name: &str) -> Option<String> {
        let from_path = || {
            LANG_FROM_PATH
                .captures(path)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        match this {
            None | Some(Self::DeriveFromPath) => from_path(),
            Some(Self::DeriveFromBasename) => LANG_FROM_BASENAME
                .captures(name)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            Some(Self::Untranslated) => None,
            Some(Self::Explicit(lang)) => Some(lang.clone()),
        }
    }
}

/// Section declared by the page's `.TH`/`.Dt` header, if plausible
fn section_from_content(content: &str, path: &str, site: &str) -> Option<String> {
    for line in content.lines() {
        if !line.starts_with(".TH") && !line.starts_with(".Dt") {
            continue;
        }
        let Some(caps) = DT_LINE.captures(line).or_else(|| TH_LINE.captures(line)) else {
            continue;
        };
        let section = caps[1].to_string();
        if section.contains('.') {
            warn!(
                "Ignoring detected section {} in {} (detected via {}): it looks like a version",
                section, path, site
            );
            return None;
        }
        return Some(section);
    }
    None
}

/// Destination of a man page below `usr/share/man`
///
/// `content` is only consulted when no section was given explicitly.
pub fn man_destination(
    path: &str,
    name: &str,
    content: Option<&str>,
    section: Option<&str>,
    language: Option<&ManLanguage>,
    site: &str,
) -> Result<String> {
    let section = match section {
        Some(section) => Some(section.to_string()),
        None => content
            .and_then(|c| section_from_content(c, path, site))
            .or_else(|| SECTION_SUFFIX.captures(name).map(|c| c[1].to_string())),
    };
    let numeric = section.as_deref().and_then(|s| {
        let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<u32>().ok()
    });
    let (Some(section), Some(numeric @ 1..=9)) = (section, numeric) else {
        return Err(Error::invalid_rule(
            site,
            format!(
                "could not determine the man page section of {path}; use `section: <number>` to declare it"
            ),
        ));
    };

    let mut basename = match name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name.to_string(),
    };
    let language = ManLanguage::resolve(language, path, name);
    let lang_dir = match &language {
        Some(lang) => {
            if let Some(stem) = basename.strip_suffix(&format!(".{lang}")) {
                basename = stem.to_string();
            }
            format!("{lang}/")
        }
        None => String::new(),
    };
    Ok(format!("usr/share/man/{lang_dir}man{numeric}/{basename}.{section}"))
}
