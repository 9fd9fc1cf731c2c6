// tests/install_rules.rs

//! Integration tests for installation and discard rules.
//!
//! Each test builds a small source package on disk, runs the full engine and
//! inspects the resulting plan.

mod common;

use common::{SourcePackage, files};
use pkgassemble::BuildContext;

#[test]
fn test_exact_rule_wins_over_later_glob() {
    let pkg = SourcePackage::new(&[("foo", "any"), ("foo-tools", "any")]);
    pkg.executable("debian/tmp/usr/bin/foo", "#!/bin/sh\n")
        .executable("debian/tmp/usr/bin/foo-helper", "#!/bin/sh\n")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/bin/foo
      into: foo
  - install:
      source: usr/bin/*
      into: foo-tools
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(files(&plan, "foo"), vec!["usr/bin/foo"]);
    assert_eq!(files(&plan, "foo-tools"), vec!["usr/bin/foo-helper"]);

    let foo = plan.package("foo").unwrap().entry("usr/bin/foo").unwrap();
    assert_eq!(foo.mode, 0o755);
    assert_eq!(foo.source.as_ref().unwrap().search_dir, "debian/tmp");
    assert!(plan.diagnostics.is_empty());
}

#[test]
fn test_overlapping_exact_installs_fail() {
    let pkg = SourcePackage::new(&[("foo", "any"), ("bar", "any")]);
    pkg.write("debian/tmp/usr/share/foo/data", "x").manifest(
        r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/share/foo/data
      into: foo
  - install:
      source: usr/share/foo/data
      into: bar
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "overlapping-install");
    assert_eq!(err.site(), Some("installations[1].install"));
    assert!(err.to_string().contains("installations[0].install"));
}

#[test]
fn test_glob_after_exact_claim_is_unmatched() {
    let pkg = SourcePackage::new(&[("foo", "any"), ("foo-tools", "any")]);
    pkg.write("debian/tmp/usr/bin/foo", "").manifest(
        r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/bin/foo
      into: foo
  - install:
      source: usr/bin/f*
      into: foo-tools
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "unmatched-pattern");
    assert!(err.to_string().contains("already matched"));
}

#[test]
fn test_docs_and_man_pages() {
    let pkg = SourcePackage::new(&[("foo", "any"), ("foo-doc", "all")]);
    pkg.write("README.md", "# foo\n")
        .write("docs/foo.1", ".TH FOO 1\n.SH NAME\nfoo\n")
        .write("docs/foo.de.8", ".TH FOO 8\n")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install-docs:
      source: README.md
      into: foo-doc
  - install-man:
      sources: [docs/foo.1, docs/foo.de.8]
      language: derive-from-basename
      into: foo
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(files(&plan, "foo-doc"), vec!["usr/share/doc/foo/README.md"]);
    assert_eq!(
        files(&plan, "foo"),
        vec!["usr/share/man/de/man8/foo.8", "usr/share/man/man1/foo.1"]
    );
}

#[test]
fn test_nodoc_skips_documentation_rules() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/bin/foo", "")
        .write("README.md", "# foo\n")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install: usr/bin/foo
  - install-docs: README.md
"#,
        );

    let plan = pkg
        .assemble_with(BuildContext::new("amd64").with_build_options("nodoc"))
        .unwrap();
    assert_eq!(files(&plan, "foo"), vec!["usr/bin/foo"]);
}

#[test]
fn test_dest_dir_as_and_multi_dest() {
    let pkg = SourcePackage::new(&[("foo", "any"), ("foo-data", "all")]);
    pkg.write("debian/tmp/usr/lib/foo/plugin.so", "")
        .write("debian/tmp/etc/foo.conf", "")
        .write("debian/tmp/usr/share/foo/schema.xml", "")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/lib/foo/plugin.so
      dest-dir: usr/lib/foo/plugins
      into: foo
  - install:
      source: etc/foo.conf
      as: etc/foo/foo.conf
      into: foo
  - multi-dest-install:
      source: usr/share/foo/schema.xml
      dest-dirs: [usr/share/foo, usr/share/xml/foo]
      into: [foo, foo-data]
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(
        files(&plan, "foo"),
        vec![
            "etc/foo/foo.conf",
            "usr/lib/foo/plugins/plugin.so",
            "usr/share/foo/schema.xml",
            "usr/share/xml/foo/schema.xml",
        ]
    );
    assert_eq!(
        files(&plan, "foo-data"),
        vec!["usr/share/foo/schema.xml", "usr/share/xml/foo/schema.xml"]
    );
}

#[test]
fn test_rename_with_several_matches_is_ambiguous() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/etc/foo/a.conf", "")
        .write("debian/tmp/etc/foo/b.conf", "")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install:
      source: etc/foo/*.conf
      as: etc/foo.conf
"#,
        );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "ambiguous-rename");
}

#[test]
fn test_discard_and_automatic_discards() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/lib/x86_64-linux-gnu/libfoo.so.1", "")
        .write("debian/tmp/usr/lib/x86_64-linux-gnu/libfoo.la", "")
        .write("debian/tmp/usr/lib/x86_64-linux-gnu/libfoo.a", "")
        .write("debian/tmp/usr/lib/python3/dist-packages/foo/__init__.py", "")
        .write("debian/tmp/usr/lib/python3/dist-packages/foo/__pycache__/__init__.cpython-312.pyc", "")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - discard: "usr/lib/{{DEB_HOST_MULTIARCH}}/*.a"
  - install:
      sources:
        - "usr/lib/{{DEB_HOST_MULTIARCH}}/*"
        - usr/lib/python3
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(
        files(&plan, "foo"),
        vec![
            "usr/lib/python3/dist-packages/foo/__init__.py",
            "usr/lib/x86_64-linux-gnu/libfoo.so.1",
        ]
    );
    assert_eq!(plan.auto_discarded.get("la-files"), Some(&1));
    assert!(plan.auto_discarded.contains_key("python-cache-files"));
    assert!(plan.diagnostics.is_empty());
}

#[test]
fn test_false_condition_reserves_paths() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/bin/foo", "")
        .write("debian/tmp/usr/bin/foo-cross-helper", "")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/bin/foo-cross-helper
      when: cross-compiling
  - install: "usr/bin/*"
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(files(&plan, "foo"), vec!["usr/bin/foo"]);
    assert!(plan.diagnostics.is_empty());

    let cross = BuildContext::new("arm64").with_build_arch("amd64");
    let plan = pkg.assemble_with(cross).unwrap();
    assert_eq!(
        files(&plan, "foo"),
        vec!["usr/bin/foo", "usr/bin/foo-cross-helper"]
    );
}

#[test]
fn test_rules_for_unbuilt_packages_may_match_nothing() {
    let pkg = SourcePackage::new(&[("foo", "any"), ("foo-efi", "arm64")]);
    pkg.write("debian/tmp/usr/bin/foo", "").manifest(
        r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/bin/foo
      into: foo
  - install:
      source: usr/lib/efi/foo.efi
      into: foo-efi
"#,
    );

    let plan = pkg.assemble().unwrap();
    assert!(plan.package("foo-efi").is_none());
    assert_eq!(files(&plan, "foo"), vec!["usr/bin/foo"]);
}

#[test]
fn test_per_package_search_dirs() {
    let pkg = SourcePackage::new(&[("libfoo1", "any"), ("libfoo1-udeb", "any")]);
    pkg.write("debian/tmp/usr/lib/libfoo.so.1", "deb")
        .write("debian/tmp-udeb/usr/lib/libfoo.so.1", "udeb")
        .config(
            r#"
check-dirs = ["debian/tmp", "debian/tmp-udeb"]
"#,
        )
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install:
      source: usr/lib/libfoo.so.1
      into: libfoo1
  - install:
      source: usr/lib/libfoo.so.1
      into: libfoo1-udeb
packages:
  libfoo1-udeb:
    installation-search-dirs: [debian/tmp-udeb]
"#,
        );

    let plan = pkg.assemble().unwrap();
    let udeb = plan.package("libfoo1-udeb").unwrap();
    let entry = udeb.entry("usr/lib/libfoo.so.1").unwrap();
    assert_eq!(entry.source.as_ref().unwrap().search_dir, "debian/tmp-udeb");
    let deb = plan.package("libfoo1").unwrap();
    let entry = deb.entry("usr/lib/libfoo.so.1").unwrap();
    assert_eq!(entry.source.as_ref().unwrap().search_dir, "debian/tmp");
    assert!(plan.diagnostics.is_empty());
}

#[test]
fn test_uninstalled_paths_are_reported() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/bin/foo", "")
        .write("debian/tmp/usr/share/foo/forgotten.txt", "")
        .manifest(
            r#"
manifest-version: "0.1"
installations:
  - install: usr/bin/foo
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(plan.diagnostics.len(), 1);
    assert_eq!(plan.diagnostics[0].code, "uninstalled-path");

    pkg.config("uninstalled = \"error\"\n");
    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "uninstalled-paths");

    pkg.config("uninstalled = \"warn\"\nsuppress = [\"uninstalled-path\"]\n");
    assert!(pkg.assemble().unwrap().diagnostics.is_empty());
}

#[test]
fn test_plan_digest_is_reproducible() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/bin/foo", "")
        .write("debian/tmp/usr/share/foo/a", "")
        .write("debian/tmp/usr/share/foo/b", "")
        .manifest("manifest-version: \"0.1\"\ninstallations:\n  - install: [usr/bin/foo, usr/share/foo]\n");

    let first = pkg.assemble().unwrap();
    let second = pkg.assemble().unwrap();
    assert_eq!(first.digest, second.digest);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_variable_in_exact_path_keeps_exact_precedence() {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/lib/lib*foo.la", "")
        .manifest(
            r#"
manifest-version: "0.1"
definitions:
  variables:
    LA_NAME: "lib*foo.la"
installations:
  - install: "usr/lib/{{LA_NAME}}"
"#,
        );

    let plan = pkg.assemble().unwrap();
    assert_eq!(files(&plan, "foo"), vec!["usr/lib/lib*foo.la"]);
    assert_eq!(plan.auto_discarded.get("la-files"), None);
    assert!(plan.diagnostics.is_empty());
}
