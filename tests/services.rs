// tests/services.rs

//! Integration tests for service detection and service rules.

mod common;

use common::SourcePackage;
use pkgassemble::ServiceRecord;
use pkgassemble::service::UpgradeRule;

const UNIT: &str = "[Unit]
Description=Foo daemon

[Service]
ExecStart=/usr/bin/food

[Install]
WantedBy=multi-user.target
Alias=foo-daemon.service
";

const STATIC_UNIT: &str = "[Unit]
Description=Foo cleanup

[Service]
Type=oneshot
ExecStart=/usr/bin/foo --cleanup
";

fn daemon() -> SourcePackage {
    let pkg = SourcePackage::new(&[("foo", "any")]);
    pkg.write("debian/tmp/usr/lib/systemd/system/foo.service", UNIT)
        .write("debian/tmp/usr/lib/systemd/system/foo-cleanup.service", STATIC_UNIT)
        .executable("debian/tmp/etc/init.d/foo", "#!/bin/sh\nexit 0\n")
        .write("debian/tmp/etc/init.d/README", "not a script\n");
    pkg
}

fn service<'a>(records: &'a [ServiceRecord], manager: &str, path: &str) -> &'a ServiceRecord {
    records
        .iter()
        .find(|r| r.manager == manager && r.path == path)
        .unwrap_or_else(|| panic!("no {manager} service at {path}"))
}

#[test]
fn test_detected_defaults() {
    let pkg = daemon();
    pkg.manifest("manifest-version: \"0.1\"\ninstallations:\n  - install: [usr, etc]\n");

    let plan = pkg.assemble().unwrap();
    let services = &plan.package("foo").unwrap().services;
    assert_eq!(services.len(), 3);

    let unit = service(services, "systemd", "usr/lib/systemd/system/foo.service");
    assert_eq!(unit.name, "foo.service");
    assert!(unit.aliases.contains(&"foo-daemon.service".to_string()));
    assert!(unit.enable_on_install);
    assert!(unit.start_on_install);
    assert_eq!(unit.on_upgrade, UpgradeRule::Restart);
    assert_eq!(unit.definition, None);

    let oneshot = service(services, "systemd", "usr/lib/systemd/system/foo-cleanup.service");
    assert!(!oneshot.enable_on_install);

    let script = service(services, "sysvinit", "etc/init.d/foo");
    assert_eq!(script.name, "foo");
    assert!(script.aliases.is_empty());
}

#[test]
fn test_rule_by_alias_adjusts_one_manager() {
    let pkg = daemon();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: [usr, etc]
packages:
  foo:
    services:
      - service: foo-daemon
        on-upgrade: reload
        start-on-install: false
        service-managers: [systemd]
"#,
    );

    let plan = pkg.assemble().unwrap();
    let services = &plan.package("foo").unwrap().services;

    let unit = service(services, "systemd", "usr/lib/systemd/system/foo.service");
    assert_eq!(unit.name, "foo-daemon");
    assert!(unit.aliases.contains(&"foo.service".to_string()));
    assert_eq!(unit.on_upgrade, UpgradeRule::Reload);
    assert!(!unit.start_on_install);
    assert_eq!(unit.definition.as_deref(), Some("packages.foo.services[0]"));

    let script = service(services, "sysvinit", "etc/init.d/foo");
    assert_eq!(script.on_upgrade, UpgradeRule::Restart);
    assert!(script.start_on_install);
}

#[test]
fn test_shorthand_rule_covers_every_manager() {
    let pkg = daemon();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: [usr, etc]
packages:
  foo:
    services:
      - foo
"#,
    );

    let plan = pkg.assemble().unwrap();
    let services = &plan.package("foo").unwrap().services;
    let defined: Vec<&str> = services
        .iter()
        .filter(|r| r.definition.is_some())
        .map(|r| r.manager.as_str())
        .collect();
    assert_eq!(defined.len(), 2);
    assert!(defined.contains(&"systemd"));
    assert!(defined.contains(&"sysvinit"));
}

#[test]
fn test_unit_without_install_section_cannot_be_enabled() {
    let pkg = daemon();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: [usr, etc]
packages:
  foo:
    services:
      - service: foo-cleanup
        enable-on-install: true
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "service-resolution");
    assert!(err.to_string().contains("[Install]"));
}

#[test]
fn test_unknown_service_fails() {
    let pkg = daemon();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: [usr, etc]
packages:
  foo:
    services:
      - service: bar
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "service-resolution");
    assert_eq!(err.site(), Some("packages.foo.services[0]"));
}

#[test]
fn test_unknown_service_manager_fails() {
    let pkg = daemon();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: [usr, etc]
packages:
  foo:
    services:
      - service: foo
        service-managers: [upstart]
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "invalid-rule");
    assert_eq!(err.site(), Some("packages.foo.services[0]"));
}

#[test]
fn test_services_see_the_transformed_tree() {
    let pkg = daemon();
    pkg.manifest(
        r#"
manifest-version: "0.1"
installations:
  - install: [usr, etc]
packages:
  foo:
    transformations:
      - remove: etc/init.d/foo
    services:
      - service: foo
        service-managers: [sysvinit]
"#,
    );

    let err = pkg.assemble().unwrap_err();
    assert_eq!(err.code(), "service-resolution");
}
