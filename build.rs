// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: source package root
fn directory_arg() -> Arg {
    Arg::new("directory")
        .short('C')
        .long("directory")
        .value_name("DIR")
        .default_value(".")
        .help("Source package root")
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_name("PATH")
        .default_value("debian/pkgassemble.toml")
        .help("Engine configuration (TOML), relative to the source root")
}

fn build_args() -> Vec<Arg> {
    vec![
        Arg::new("manifest").long("manifest").value_name("PATH").help("Manifest path"),
        Arg::new("control").long("control").value_name("PATH").help("Control file path"),
        Arg::new("host_arch").long("host-arch").value_name("ARCH").help("Host architecture"),
        Arg::new("build_arch").long("build-arch").value_name("ARCH").help("Build architecture"),
        Arg::new("build_profiles")
            .long("build-profiles")
            .value_name("PROFILES")
            .help("Active build profiles, comma or space separated"),
        Arg::new("build_options")
            .long("build-options")
            .value_name("OPTIONS")
            .help("Build options in DEB_BUILD_OPTIONS syntax"),
    ]
}

fn build_cli() -> Command {
    Command::new("pkgassemble")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assemble binary package trees from a declarative manifest")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("assemble")
                .about("Evaluate the manifest and emit the assembly plan")
                .arg(directory_arg())
                .arg(config_arg())
                .args(build_args())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Write the JSON plan here instead of standard output"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Evaluate the manifest and report diagnostics only")
                .arg(directory_arg())
                .arg(config_arg())
                .args(build_args()),
        )
        .subcommand(
            Command::new("capabilities")
                .about("List the registered capabilities")
                .arg(directory_arg())
                .arg(config_arg())
                .arg(Arg::new("format").long("format").default_value("text").help("Output format: text, json"))
                .arg(
                    Arg::new("declarative")
                        .long("declarative")
                        .action(ArgAction::SetTrue)
                        .help("Only show data-only capabilities"),
                ),
        )
}

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return Ok(()),
    };
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = build_cli();
    let mut buffer = Vec::new();
    Man::new(cmd.clone()).render(&mut buffer)?;
    fs::write(man_dir.join("pkgassemble.1"), buffer)?;

    for sub in cmd.get_subcommands() {
        let name = format!("pkgassemble-{}", sub.get_name());
        let mut buffer = Vec::new();
        Man::new(sub.clone()).render(&mut buffer)?;
        fs::write(man_dir.join(format!("{name}.1")), buffer)?;
    }
    Ok(())
}
