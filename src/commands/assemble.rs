// src/commands/assemble.rs
//! Assemble command

use super::{build_context, open_assembler};
use crate::cli::{BuildArgs, SourceArgs};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Evaluate the manifest and write the plan as JSON
pub fn cmd_assemble(source: &SourceArgs, build: &BuildArgs, output: Option<&Path>) -> Result<()> {
    let assembler = open_assembler(source, build_context(build))?;
    let plan = assembler.run().context("Assembly failed")?;

    for diagnostic in &plan.diagnostics {
        eprintln!("{}", diagnostic);
    }

    let json = plan.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write plan to {}", path.display()))?;
            info!("Wrote plan for {} package(s) to {}", plan.packages.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
