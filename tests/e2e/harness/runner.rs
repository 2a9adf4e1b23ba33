use super::assertions::Assertion;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, Context, Result};
use depot_core::{Depot, GcConfig, PinnedBlob, PruneReport, RepoPath, VerifyConfig};
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::time::{Duration, SystemTime};

/// Executes scenarios against a real storage root
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    depot: Option<Depot>,
    open_blobs: Vec<PinnedBlob>,
    last_gc: Option<PruneReport>,
    current_step: usize,
}

impl ScenarioRunner {
    /// Create a runner over an initialized depot in `workspace`
    pub fn new(workspace: TestWorkspace) -> Result<Self> {
        let depot = workspace.init_depot()?;
        Ok(Self {
            workspace,
            depot: Some(depot),
            open_blobs: Vec::new(),
            last_gc: None,
            current_step: 0,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Deploy {
                repo,
                path,
                content,
            } => self.handle_deploy(repo, path, content),
            ScenarioStep::DeployRejected { repo, path } => self.handle_deploy_rejected(repo, path),
            ScenarioStep::DeleteItem { repo, path } => self.handle_delete(repo, path),

            ScenarioStep::OpenBinary { repo, path } => self.handle_open_binary(repo, path),
            ScenarioStep::CloseBinaries => {
                self.open_blobs.clear();
                Ok(())
            }

            ScenarioStep::AgeBinaries { by } => self.handle_age_binaries(*by),
            ScenarioStep::CorruptBinary { repo, path } => self.handle_corrupt(repo, path),

            ScenarioStep::Gc {
                dry_run,
                aggressive,
            } => self.handle_gc(*dry_run, *aggressive),

            ScenarioStep::Reopen => self.handle_reopen(),

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    fn depot(&self) -> Result<&Depot> {
        self.depot
            .as_ref()
            .ok_or_else(|| anyhow!("Depot not available"))
    }

    // ===== Step handlers =====

    fn handle_deploy(&mut self, repo: &str, path: &str, content: &[u8]) -> Result<()> {
        let item = self.depot()?.deploy(repo, path, content, Some("e2e"))?;
        if item.size() != content.len() as u64 {
            return Err(anyhow!(
                "Deployed size mismatch: expected {}, got {}",
                content.len(),
                item.size()
            ));
        }
        Ok(())
    }

    fn handle_deploy_rejected(&mut self, repo: &str, path: &str) -> Result<()> {
        match self.depot()?.deploy(repo, path, &b"rejected"[..], None) {
            Ok(_) => Err(anyhow!("Expected deploy to {}:{} to be rejected", repo, path)),
            Err(_) => Ok(()),
        }
    }

    fn handle_delete(&mut self, repo: &str, path: &str) -> Result<()> {
        let deleted = self
            .depot()?
            .item_store()
            .delete(&RepoPath::new(repo, path))?;
        if !deleted {
            return Err(anyhow!("No item at {}:{} to delete", repo, path));
        }
        Ok(())
    }

    fn handle_open_binary(&mut self, repo: &str, path: &str) -> Result<()> {
        let depot = self.depot()?;
        let item = depot
            .info(&RepoPath::new(repo, path))?
            .ok_or_else(|| anyhow!("No item at {}:{}", repo, path))?;
        let blob = depot.open_binary(&item)?;
        self.open_blobs.push(blob);
        Ok(())
    }

    fn handle_age_binaries(&mut self, by: Duration) -> Result<()> {
        let depot = self.depot()?;
        let store = depot.binary_store();
        let past = SystemTime::now()
            .checked_sub(by)
            .ok_or_else(|| anyhow!("Cannot age binaries by {:?}", by))?;
        for blob in store.list_all()? {
            let file = OpenOptions::new()
                .write(true)
                .open(store.blob_path(&blob.sha1))?;
            file.set_modified(past)?;
        }
        Ok(())
    }

    fn handle_corrupt(&mut self, repo: &str, path: &str) -> Result<()> {
        let depot = self.depot()?;
        let item = depot
            .info(&RepoPath::new(repo, path))?
            .ok_or_else(|| anyhow!("No item at {}:{}", repo, path))?;
        let sha1 = item
            .sha1()
            .ok_or_else(|| anyhow!("Item {}:{} has no binary", repo, path))?;
        fs::write(depot.binary_store().blob_path(sha1), b"bit rot")?;
        Ok(())
    }

    fn handle_gc(&mut self, dry_run: bool, aggressive: bool) -> Result<()> {
        let depot = self.depot()?;
        let mut config = GcConfig {
            dry_run,
            ..depot.gc_config()
        };
        if aggressive {
            config.grace_period = Duration::ZERO;
        }
        let report = depot.gc(&config, None)?;
        if !report.errors.is_empty() {
            return Err(anyhow!("GC reported errors: {:?}", report.errors));
        }
        self.last_gc = Some(report);
        Ok(())
    }

    fn handle_reopen(&mut self) -> Result<()> {
        self.open_blobs.clear();
        self.depot = None;
        self.depot = Some(self.workspace.open_depot()?);
        Ok(())
    }

    // ===== Assertions =====

    fn handle_assertion(&self, assertion: &Assertion) -> Result<()> {
        let depot = self.depot()?;
        match assertion {
            Assertion::ItemExists { repo, path } => {
                if depot.info(&RepoPath::new(repo, path))?.is_none() {
                    return Err(anyhow!("Expected item {}:{} to exist", repo, path));
                }
                Ok(())
            }
            Assertion::ItemMissing { repo, path } => {
                if depot.info(&RepoPath::new(repo, path))?.is_some() {
                    return Err(anyhow!("Expected no item at {}:{}", repo, path));
                }
                Ok(())
            }
            Assertion::ItemContent {
                repo,
                path,
                content,
            } => self.assert_item_content(depot, repo, path, content),
            Assertion::BinaryCount(expected) => {
                let count = depot.binary_store().list_all()?.len();
                if count != *expected {
                    return Err(anyhow!(
                        "Binary count mismatch: expected {}, got {}",
                        expected,
                        count
                    ));
                }
                Ok(())
            }
            Assertion::SearchOrder {
                virtual_key,
                path,
                keys,
            } => {
                let resolved = depot.resolve(virtual_key)?;
                let actual: Vec<&str> = match path {
                    Some(path) => resolved.search_order(path).iter().map(|r| r.key()).collect(),
                    None => resolved.ordered_keys(),
                };
                if actual != *keys {
                    return Err(anyhow!(
                        "Search order mismatch for {}: expected {:?}, got {:?}",
                        virtual_key,
                        keys,
                        actual
                    ));
                }
                Ok(())
            }
            Assertion::HasCycle {
                virtual_key,
                expected,
            } => {
                let actual = depot.resolve(virtual_key)?.has_cycle();
                if actual != *expected {
                    return Err(anyhow!(
                        "Cycle flag mismatch for {}: expected {}, got {}",
                        virtual_key,
                        expected,
                        actual
                    ));
                }
                Ok(())
            }
            Assertion::FoundIn {
                virtual_key,
                path,
                repo,
            } => {
                let found = depot.find(virtual_key, path)?;
                let actual = found.as_ref().map(|item| item.repo_path.repo_key());
                if actual != repo.as_deref() {
                    return Err(anyhow!(
                        "Lookup of {} through {}: expected {:?}, got {:?}",
                        path,
                        virtual_key,
                        repo,
                        actual
                    ));
                }
                Ok(())
            }
            Assertion::GcDeleted(expected) => {
                let report = self.last_gc()?;
                check_count("deleted", *expected, report.blobs_deleted)
            }
            Assertion::GcPinned(expected) => {
                let report = self.last_gc()?;
                check_count("pinned", *expected, report.blobs_pinned)
            }
            Assertion::GcRecent(expected) => {
                let report = self.last_gc()?;
                check_count("recent", *expected, report.blobs_recent)
            }
            Assertion::VerifyClean => {
                let report = depot.verify(&VerifyConfig::default())?;
                if report.has_issues() {
                    return Err(anyhow!("Expected clean verify: {}", report.summary()));
                }
                Ok(())
            }
            Assertion::VerifyCorrupted(expected) => {
                let report = depot.verify(&VerifyConfig::default())?;
                check_count("corrupted", *expected, report.corrupted.len())
            }
            Assertion::Custom(check) => check(depot),
        }
    }

    fn assert_item_content(
        &self,
        depot: &Depot,
        repo: &str,
        path: &str,
        expected: &[u8],
    ) -> Result<()> {
        let item = depot
            .info(&RepoPath::new(repo, path))?
            .ok_or_else(|| anyhow!("No item at {}:{}", repo, path))?;
        let mut actual = Vec::new();
        depot.open_binary(&item)?.read_to_end(&mut actual)?;
        if actual != expected {
            return Err(anyhow!(
                "Content mismatch for {}:{}: expected {} bytes, got {} bytes",
                repo,
                path,
                expected.len(),
                actual.len()
            ));
        }
        Ok(())
    }

    fn last_gc(&self) -> Result<&PruneReport> {
        self.last_gc
            .as_ref()
            .ok_or_else(|| anyhow!("No GC has run in this scenario"))
    }
}

fn check_count(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(anyhow!(
            "{} count mismatch: expected {}, got {}",
            what,
            expected,
            actual
        ));
    }
    Ok(())
}
