use crate::harness::{Assertion, Scenario};

const JAR: &str = "org/acme/app/1.0/app-1.0.jar";
const OTHER: &str = "org/acme/lib/2.0/lib-2.0.jar";

#[test]
fn test_orphan_is_kept_during_grace_period() {
    Scenario::new("grace_period")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"orphan soon")
        .delete("libs-release-local", JAR)
        .gc()
        .assert_gc_deleted(0)
        .assert(Assertion::GcRecent(1))
        .assert_binary_count(1)
        .age_binaries_hours(2)
        .gc()
        .assert_gc_deleted(1)
        .assert_binary_count(0)
        .run()
        .unwrap();
}

#[test]
fn test_referenced_binaries_survive() {
    Scenario::new("referenced_survive")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"keep me")
        .deploy("libs-release-local", OTHER, b"drop me")
        .delete("libs-release-local", OTHER)
        .age_binaries_hours(2)
        .gc()
        .assert_gc_deleted(1)
        .assert_binary_count(1)
        .assert_content("libs-release-local", JAR, b"keep me")
        .assert_verify_clean()
        .run()
        .unwrap();
}

#[test]
fn test_open_binary_is_never_collected() {
    Scenario::new("pinned")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"being downloaded")
        .open_binary("libs-release-local", JAR)
        .delete("libs-release-local", JAR)
        .gc_aggressive()
        .assert_gc_deleted(0)
        .assert(Assertion::GcPinned(1))
        .assert_binary_count(1)
        .close_binaries()
        .gc_aggressive()
        .assert_gc_deleted(1)
        .assert_binary_count(0)
        .run()
        .unwrap();
}

#[test]
fn test_dry_run_deletes_nothing() {
    Scenario::new("dry_run")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"x")
        .delete("libs-release-local", JAR)
        .gc_dry_run()
        .assert_gc_deleted(1)
        .assert_binary_count(1)
        .run()
        .unwrap();
}

#[test]
fn test_shared_binary_survives_until_last_reference_goes() {
    Scenario::new("shared_binary")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"shared")
        .deploy("libs-release-local", OTHER, b"shared")
        .delete("libs-release-local", JAR)
        .gc_aggressive()
        .assert_gc_deleted(0)
        .assert_content("libs-release-local", OTHER, b"shared")
        .delete("libs-release-local", OTHER)
        .gc_aggressive()
        .assert_gc_deleted(1)
        .run()
        .unwrap();
}
