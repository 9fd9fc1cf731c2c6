// src/commands/check.rs
//! Check command: evaluate everything, print diagnostics, emit no plan

use super::{build_context, open_assembler};
use crate::cli::{BuildArgs, SourceArgs};
use anyhow::Result;
use pkgassemble::Diagnostic;

pub fn cmd_check(source: &SourceArgs, build: &BuildArgs) -> Result<()> {
    let assembler = open_assembler(source, build_context(build))?;
    match assembler.run() {
        Ok(plan) => {
            for diagnostic in &plan.diagnostics {
                println!("{}", diagnostic);
                if let Some(site) = &diagnostic.site {
                    println!("  --> {}", site);
                }
            }
            println!(
                "OK: {} package(s), {} diagnostic(s), digest {}",
                plan.packages.len(),
                plan.diagnostics.len(),
                plan.digest
            );
            Ok(())
        }
        Err(e) => {
            let diagnostic = Diagnostic::from_error(&e);
            println!("{}", diagnostic);
            if let Some(site) = &diagnostic.site {
                println!("  --> {}", site);
            }
            anyhow::bail!("Manifest check failed ({})", diagnostic.code)
        }
    }
}
