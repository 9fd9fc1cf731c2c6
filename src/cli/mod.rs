// src/cli/mod.rs
//! CLI definitions for pkgassemble
//!
//! Argument parsing only; the handlers live in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgassemble")]
#[command(author, version)]
#[command(about = "Assemble binary package trees from a declarative manifest", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the source package lives and which files describe it
#[derive(Args, Clone, Debug)]
pub struct SourceArgs {
    /// Source package root
    #[arg(short = 'C', long, default_value = ".")]
    pub directory: PathBuf,

    /// Engine configuration (TOML), relative to the source root
    #[arg(long, default_value = "debian/pkgassemble.toml")]
    pub config: PathBuf,

    /// Manifest path, overriding the configuration
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Control file path, overriding the configuration
    #[arg(long)]
    pub control: Option<PathBuf>,
}

/// Overrides for the build environment normally taken from `DEB_*` variables
#[derive(Args, Clone, Debug, Default)]
pub struct BuildArgs {
    /// Host architecture (default: $DEB_HOST_ARCH or the native one)
    #[arg(long)]
    pub host_arch: Option<String>,

    /// Build architecture (default: $DEB_BUILD_ARCH or the native one)
    #[arg(long)]
    pub build_arch: Option<String>,

    /// Active build profiles, comma or space separated
    #[arg(long)]
    pub build_profiles: Option<String>,

    /// Build options in DEB_BUILD_OPTIONS syntax, e.g. "nocheck nodoc"
    #[arg(long)]
    pub build_options: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate the manifest and emit the assembly plan
    ///
    /// The plan lists every path of every built package with its origin,
    /// ownership and mode, plus resolved services and postrm fragments.
    Assemble {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        build: BuildArgs,

        /// Write the JSON plan here instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate the manifest and report diagnostics only
    Check {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// List the registered capabilities
    Capabilities {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Only show data-only capabilities
        #[arg(long)]
        declarative: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_assemble() {
        let cli = Cli::try_parse_from([
            "pkgassemble",
            "-v",
            "assemble",
            "-C",
            "/src/foo",
            "--host-arch",
            "arm64",
            "--build-profiles",
            "nocheck,nodoc",
            "-o",
            "plan.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Assemble {
                source,
                build,
                output,
            } => {
                assert_eq!(source.directory, PathBuf::from("/src/foo"));
                assert_eq!(build.host_arch.as_deref(), Some("arm64"));
                assert_eq!(build.build_profiles.as_deref(), Some("nocheck,nodoc"));
                assert_eq!(output, Some(PathBuf::from("plan.json")));
            }
            _ => panic!("expected assemble"),
        }
    }
}
