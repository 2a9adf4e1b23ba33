use crate::harness::{Assertion, Scenario};
use depot_core::VerifyConfig;

const JAR: &str = "org/acme/app/1.0/app-1.0.jar";

#[test]
fn test_fresh_depot_verifies_clean() {
    Scenario::new("fresh_clean")
        .from_fixture("default")
        .assert_verify_clean()
        .deploy("libs-release-local", JAR, b"content")
        .assert_verify_clean()
        .run()
        .unwrap();
}

#[test]
fn test_corruption_is_detected() {
    Scenario::new("corruption")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"original content")
        .corrupt_binary("libs-release-local", JAR)
        .assert(Assertion::VerifyCorrupted(1))
        .assert(Assertion::Custom(Box::new(|depot| {
            let quick = VerifyConfig {
                check_content: false,
                ..VerifyConfig::default()
            };
            let report = depot.verify(&quick)?;
            anyhow::ensure!(!report.has_issues(), "quick verify should not hash content");
            Ok(())
        })))
        .run()
        .unwrap();
}

#[test]
fn test_missing_binary_is_reported() {
    Scenario::new("missing_binary")
        .from_fixture("default")
        .deploy("libs-release-local", JAR, b"content")
        .assert(Assertion::Custom(Box::new(|depot| {
            let item = depot
                .info(&depot_core::RepoPath::new("libs-release-local", JAR))?
                .ok_or_else(|| anyhow::anyhow!("item missing"))?;
            let sha1 = item.sha1().ok_or_else(|| anyhow::anyhow!("no binary"))?;
            std::fs::remove_file(depot.binary_store().blob_path(sha1))?;

            let report = depot.verify(&VerifyConfig::default())?;
            anyhow::ensure!(
                report.dangling_items.len() == 1,
                "expected one dangling item, got {:?}",
                report.dangling_items
            );
            Ok(())
        })))
        .run()
        .unwrap();
}
