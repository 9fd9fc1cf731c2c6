// src/commands/mod.rs
//! Command handlers for the pkgassemble CLI

mod assemble;
mod capabilities;
mod check;

pub use assemble::cmd_assemble;
pub use capabilities::cmd_capabilities;
pub use check::cmd_check;

use crate::cli::{BuildArgs, SourceArgs};
use anyhow::{Context, Result};
use pkgassemble::{Assembler, BuildContext, EngineConfig};

/// Build context from the environment, with command line overrides applied
pub(crate) fn build_context(args: &BuildArgs) -> BuildContext {
    let mut build = match &args.host_arch {
        Some(host) => BuildContext::new(host.as_str()),
        None => BuildContext::from_env(),
    };
    if let Some(arch) = &args.build_arch {
        build = build.with_build_arch(arch.as_str());
    }
    if let Some(profiles) = &args.build_profiles {
        build = build.with_build_profiles(
            profiles
                .split([',', ' '])
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
    }
    if let Some(options) = &args.build_options {
        build = build.with_build_options(options);
    }
    build
}

/// Load the configuration and create an assembler for the source package
pub(crate) fn open_assembler(source: &SourceArgs, build: BuildContext) -> Result<Assembler> {
    let config_path = source.directory.join(&source.config);
    let mut config = EngineConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
    if let Some(manifest) = &source.manifest {
        config.manifest = manifest.clone();
    }
    if let Some(control) = &source.control {
        config.control = control.clone();
    }
    Assembler::new(&source.directory, config, build).context("Failed to register capabilities")
}
