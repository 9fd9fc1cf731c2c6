// tests/common/mod.rs

//! Shared helpers for integration tests.
//!
//! A [`SourcePackage`] is a throwaway source tree: a control file, a
//! manifest, and the staging directories a build would have left behind.

#![allow(dead_code)]

use pkgassemble::{Assembler, AssemblyPlan, BuildContext, EngineConfig, Result};
use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::Path;
use tempfile::TempDir;

pub struct SourcePackage {
    dir: TempDir,
}

impl SourcePackage {
    /// Source package with the given `(name, architecture)` binaries
    pub fn new(binaries: &[(&str, &str)]) -> Self {
        let pkg = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        let mut control = String::from("Source: example\nMaintainer: Example <example@example.org>\n");
        for (name, arch) in binaries {
            control.push_str(&format!("\nPackage: {name}\nArchitecture: {arch}\n"));
        }
        pkg.write("debian/control", &control);
        pkg
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file below the source root, creating parents
    pub fn write(&self, path: &str, content: &str) -> &Self {
        let full = self.root().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, content).unwrap();
        fs::set_permissions(&full, fs::Permissions::from_mode(0o644)).unwrap();
        self
    }

    pub fn executable(&self, path: &str, content: &str) -> &Self {
        self.write(path, content);
        fs::set_permissions(self.root().join(path), fs::Permissions::from_mode(0o755)).unwrap();
        self
    }

    pub fn symlink(&self, path: &str, target: &str) -> &Self {
        let full = self.root().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        symlink(target, &full).unwrap();
        self
    }

    pub fn mkdir(&self, path: &str) -> &Self {
        fs::create_dir_all(self.root().join(path)).unwrap();
        self
    }

    pub fn manifest(&self, yaml: &str) -> &Self {
        self.write("debian/pkgassemble.manifest", yaml)
    }

    pub fn config(&self, toml: &str) -> &Self {
        self.write("debian/pkgassemble.toml", toml)
    }

    /// Assemble for a native amd64 build
    pub fn assemble(&self) -> Result<AssemblyPlan> {
        self.assemble_with(BuildContext::new("amd64"))
    }

    pub fn assemble_with(&self, build: BuildContext) -> Result<AssemblyPlan> {
        let config = EngineConfig::load_or_default(&self.root().join("debian/pkgassemble.toml"))?;
        Assembler::new(self.root(), config, build)?.run()
    }
}

/// Paths of a package in the plan, in order
pub fn paths(plan: &AssemblyPlan, package: &str) -> Vec<String> {
    plan.package(package)
        .unwrap_or_else(|| panic!("package {package} is not in the plan"))
        .entries
        .iter()
        .map(|e| e.path.clone())
        .collect()
}

/// Installed non-directory paths of a package
pub fn files(plan: &AssemblyPlan, package: &str) -> Vec<String> {
    plan.package(package)
        .unwrap_or_else(|| panic!("package {package} is not in the plan"))
        .entries
        .iter()
        .filter(|e| !matches!(e.kind, pkgassemble::filesystem::NodeKind::Directory))
        .map(|e| e.path.clone())
        .collect()
}
