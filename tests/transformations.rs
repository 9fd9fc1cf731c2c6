// tests/transformations.rs

//! Integration tests for per-package transformations and clean-after-removal.

mod common;

use common::{SourcePackage, paths};
use pkgassemble::filesystem::NodeKind;

fn staged_with(binaries: &[(&str, &str)]) -> SourcePackage {
    let pkg = SourcePackage::new(binaries);
    pkg.executable("debian/tmp/usr/bin/foo", "#!/bin/sh\n")
        .write("debian/tmp/usr/share/foo/default.conf", "a=1\n")
        .write("debian/tmp/usr/share/foo/data/index.txt", "");
    pkg
}

fn staged() -> SourcePackage {
    staged_with(&[("foo", "any")])
}

#[test]
fn test_transformations_apply_in_order() {
    let pkg = staged();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    transformations:
      - move:
          source: usr/share/foo/default.conf
          target: etc/foo/foo.conf
      - create-symlink:
          path: usr/bin/foo-compat
          target: foo
      - path-metadata:
          path: usr/bin/foo
          group: adm
          mode: o-rwx
      - create-directories:
          path: var/lib/foo
          owner: daemon
          mode: "0700"
      - remove:
          path: usr/share/foo/data
          when:
            arch-matches: arm64
"#,
    );

    let plan = pkg.assemble().unwrap();
    let foo = plan.package("foo").unwrap();

    let conf = foo.entry("etc/foo/foo.conf").unwrap();
    assert_eq!(conf.kind, NodeKind::File);
    assert_eq!(conf.source.as_ref().unwrap().path, "usr/share/foo/default.conf");
    assert!(foo.entry("usr/share/foo/default.conf").is_none());

    let link = foo.entry("usr/bin/foo-compat").unwrap();
    assert_eq!(
        link.kind,
        NodeKind::Symlink {
            target: "foo".to_string()
        }
    );
    assert_eq!(link.mode, 0o777);

    let bin = foo.entry("usr/bin/foo").unwrap();
    assert_eq!(bin.mode, 0o750);
    assert_eq!(bin.owner, "root:0");
    assert_eq!(bin.group, "adm:4");

    let state = foo.entry("var/lib/foo").unwrap();
    assert_eq!(state.kind, NodeKind::Directory);
    assert_eq!(state.mode, 0o700);
    assert_eq!(state.owner, "daemon:1");

    // The arm64-only removal did not run on amd64
    assert!(foo.entry("usr/share/foo/data/index.txt").is_some());
    assert!(plan.diagnostics.is_empty());
}

#[test]
fn test_removed_paths_are_gone_with_their_empty_parents() {
    let pkg = staged();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    transformations:
      - remove: usr/share/foo
"#,
    );

    let plan = pkg.assemble().unwrap();
    assert_eq!(paths(&plan, "foo"), vec!["usr", "usr/bin", "usr/bin/foo"]);
}

#[test]
fn test_unmatched_remove_names_its_site() {
    let pkg = staged();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    transformations:
      - remove: usr/share/doc/foo/changelog.gz
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "unmatched-pattern");
    assert_eq!(err.site(), Some("packages.foo.transformations[0].remove"));
}

#[test]
fn test_symlink_replacement_rules() {
    let pkg = staged();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    transformations:
      - create-symlink:
          path: usr/share/foo/data
          target: /var/lib/foo/data
"#,
    );
    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "replacement-policy-violation");

    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    transformations:
      - create-symlink:
          path: usr/share/foo/data
          target: /var/lib/foo/data
          replacement-rule: discard-existing
"#,
    );
    let plan = pkg.assemble().unwrap();
    let foo = plan.package("foo").unwrap();
    assert_eq!(
        foo.entry("usr/share/foo/data").unwrap().kind,
        NodeKind::Symlink {
            target: "/var/lib/foo/data".to_string()
        }
    );
    assert!(foo.entry("usr/share/foo/data/index.txt").is_none());
}

#[test]
fn test_move_refuses_to_merge_directories() {
    let pkg = staged();
    pkg.write("debian/tmp/usr/lib/foo/data/other.txt", "").manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    transformations:
      - move:
          source: usr/lib/foo/data
          target: usr/share/foo/
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "directory-merge-conflict");
    assert_eq!(err.site(), Some("packages.foo.transformations[0].move"));
}

#[test]
fn test_clean_after_removal_snippets() {
    let pkg = staged();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    clean-after-removal:
      - var/log/foo/*.log
      - path: var/cache/foo
        recursive: true
        delete-on: removal
"#,
    );

    let plan = pkg.assemble().unwrap();
    let foo = plan.package("foo").unwrap();
    assert_eq!(foo.clean_after_removal.len(), 2);
    assert_eq!(
        foo.postrm_snippet().unwrap(),
        concat!(
            "if [ \"$1\" = \"purge\" ]; then\n",
            "    rm -f \"${DPKG_ROOT}\"/var/log/foo/*.log\n",
            "fi\n",
            "\n",
            "if [ \"$1\" = \"remove\" ]; then\n",
            "    rm -fr \"${DPKG_ROOT}\"/var/cache/foo\n",
            "fi\n",
        )
    );
    // Clean rules never touch the tree
    assert!(foo.entry("var").is_none());
}

#[test]
fn test_unsafe_clean_path_is_rejected() {
    let pkg = staged();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: usr
packages:
  foo:
    clean-after-removal:
      - usr/bin/*
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "invalid-rule");
    assert_eq!(err.site(), Some("packages.foo.clean-after-removal[0]"));
}

#[test]
fn test_transformations_of_unbuilt_packages_are_skipped() {
    let pkg = staged_with(&[("foo", "any"), ("foo-efi", "arm64")]);
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr
      into: foo
packages:
  foo-efi:
    transformations:
      - remove: usr/lib/efi/foo.efi
"#,
    );

    let plan = pkg.assemble().unwrap();
    assert_eq!(plan.packages.len(), 1);
    assert!(plan.diagnostics.is_empty());
}
