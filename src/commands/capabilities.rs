// src/commands/capabilities.rs
//! List registered capabilities

use super::open_assembler;
use crate::cli::SourceArgs;
use anyhow::Result;
use pkgassemble::BuildContext;

pub fn cmd_capabilities(source: &SourceArgs, format: &str, declarative: bool) -> Result<()> {
    let assembler = open_assembler(source, BuildContext::from_env())?;
    let registry = assembler.registry();
    let capabilities = if declarative {
        registry.declarative_only().capabilities()
    } else {
        registry.capabilities()
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&capabilities)?),
        "text" => {
            for cap in &capabilities {
                let marker = if cap.executable { " (executable)" } else { "" };
                println!("{:<24} {:?}{}", cap.name, cap.kind, marker);
                if !cap.description.is_empty() {
                    println!("    {}", cap.description);
                }
            }
        }
        other => anyhow::bail!("Unknown format '{}' (expected text or json)", other),
    }
    Ok(())
}
