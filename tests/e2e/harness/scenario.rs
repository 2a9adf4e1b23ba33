use super::assertions::Assertion;
use super::runner::ScenarioRunner;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use std::time::Duration;

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    fixture: Option<String>,
    config: Option<String>,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fixture: None,
            config: None,
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    /// Start from a fixture directory (its depot.toml is used on init)
    pub fn from_fixture(mut self, fixture_name: &str) -> Self {
        self.fixture = Some(fixture_name.to_string());
        self
    }

    /// Start from inline depot.toml text
    pub fn with_config(mut self, toml: &str) -> Self {
        self.config = Some(toml.to_string());
        self
    }

    // ===== Writes =====

    /// Deploy content to repo:path
    pub fn deploy(mut self, repo: &str, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::Deploy {
            repo: repo.to_string(),
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    /// Deploy to repo:path and expect a refusal
    pub fn deploy_rejected(mut self, repo: &str, path: &str) -> Self {
        self.steps.push(ScenarioStep::DeployRejected {
            repo: repo.to_string(),
            path: path.to_string(),
        });
        self
    }

    /// Delete the item at repo:path, leaving its binary orphaned
    pub fn delete(mut self, repo: &str, path: &str) -> Self {
        self.steps.push(ScenarioStep::DeleteItem {
            repo: repo.to_string(),
            path: path.to_string(),
        });
        self
    }

    // ===== Readers =====

    /// Open the binary of repo:path and keep it open
    pub fn open_binary(mut self, repo: &str, path: &str) -> Self {
        self.steps.push(ScenarioStep::OpenBinary {
            repo: repo.to_string(),
            path: path.to_string(),
        });
        self
    }

    /// Close every binary opened so far
    pub fn close_binaries(mut self) -> Self {
        self.steps.push(ScenarioStep::CloseBinaries);
        self
    }

    // ===== Filestore =====

    /// Push every blob's mtime into the past
    pub fn age_binaries(mut self, by: Duration) -> Self {
        self.steps.push(ScenarioStep::AgeBinaries { by });
        self
    }

    /// Age binaries by whole hours
    pub fn age_binaries_hours(self, hours: u64) -> Self {
        self.age_binaries(Duration::from_secs(hours * 3600))
    }

    /// Overwrite the binary behind repo:path
    pub fn corrupt_binary(mut self, repo: &str, path: &str) -> Self {
        self.steps.push(ScenarioStep::CorruptBinary {
            repo: repo.to_string(),
            path: path.to_string(),
        });
        self
    }

    // ===== Maintenance =====

    /// Run GC with configured grace period
    pub fn gc(mut self) -> Self {
        self.steps.push(ScenarioStep::Gc {
            dry_run: false,
            aggressive: false,
        });
        self
    }

    /// Run GC without a grace period
    pub fn gc_aggressive(mut self) -> Self {
        self.steps.push(ScenarioStep::Gc {
            dry_run: false,
            aggressive: true,
        });
        self
    }

    /// Run GC in dry-run mode without a grace period
    pub fn gc_dry_run(mut self) -> Self {
        self.steps.push(ScenarioStep::Gc {
            dry_run: true,
            aggressive: true,
        });
        self
    }

    /// Close and reopen the depot
    pub fn reopen(mut self) -> Self {
        self.steps.push(ScenarioStep::Reopen);
        self
    }

    // ===== Assertions =====

    /// Add a general assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    /// Assert an item exists
    pub fn assert_item(self, repo: &str, path: &str) -> Self {
        self.assert(Assertion::ItemExists {
            repo: repo.to_string(),
            path: path.to_string(),
        })
    }

    /// Assert no item exists
    pub fn assert_no_item(self, repo: &str, path: &str) -> Self {
        self.assert(Assertion::ItemMissing {
            repo: repo.to_string(),
            path: path.to_string(),
        })
    }

    /// Assert an item's binary reads back as `content`
    pub fn assert_content(self, repo: &str, path: &str, content: &[u8]) -> Self {
        self.assert(Assertion::ItemContent {
            repo: repo.to_string(),
            path: path.to_string(),
            content: content.to_vec(),
        })
    }

    /// Assert the number of stored binaries
    pub fn assert_binary_count(self, count: usize) -> Self {
        self.assert(Assertion::BinaryCount(count))
    }

    /// Assert the full search order of a virtual repository
    pub fn assert_search_order(self, virtual_key: &str, keys: &[&str]) -> Self {
        self.assert(Assertion::SearchOrder {
            virtual_key: virtual_key.to_string(),
            path: None,
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
    }

    /// Assert the search order for one path
    pub fn assert_search_order_for(self, virtual_key: &str, path: &str, keys: &[&str]) -> Self {
        self.assert(Assertion::SearchOrder {
            virtual_key: virtual_key.to_string(),
            path: Some(path.to_string()),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
    }

    /// Assert where a lookup through a virtual repository lands
    pub fn assert_found_in(self, virtual_key: &str, path: &str, repo: Option<&str>) -> Self {
        self.assert(Assertion::FoundIn {
            virtual_key: virtual_key.to_string(),
            path: path.to_string(),
            repo: repo.map(str::to_string),
        })
    }

    /// Assert the last GC deleted `count` binaries
    pub fn assert_gc_deleted(self, count: usize) -> Self {
        self.assert(Assertion::GcDeleted(count))
    }

    /// Assert verify finds nothing wrong
    pub fn assert_verify_clean(self) -> Self {
        self.assert(Assertion::VerifyClean)
    }

    // ===== Execution =====

    /// Execute the scenario and return results
    pub fn run(self) -> ScenarioResult {
        let workspace = match self.prepare_workspace() {
            Ok(w) => w,
            Err(e) => return self.setup_failure(e),
        };
        let mut runner = match ScenarioRunner::new(workspace) {
            Ok(r) => r,
            Err(e) => return self.setup_failure(e),
        };

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let failure_step = runner.current_step();
                ScenarioResult {
                    name: self.name,
                    success: false,
                    steps_executed: failure_step,
                    failure_step: Some(failure_step),
                    error: Some(format!("{:?}", e)),
                }
            }
        }
    }

    fn prepare_workspace(&self) -> anyhow::Result<TestWorkspace> {
        let workspace = match &self.fixture {
            Some(name) => TestWorkspace::from_fixture(name)?,
            None => TestWorkspace::empty()?,
        };
        if let Some(toml) = &self.config {
            workspace.write_file("depot.toml", toml.as_bytes())?;
        }
        Ok(workspace)
    }

    fn setup_failure(&self, error: anyhow::Error) -> ScenarioResult {
        ScenarioResult {
            name: self.name.clone(),
            success: false,
            steps_executed: 0,
            failure_step: Some(0),
            error: Some(format!("Failed to create runner: {:?}", error)),
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    /// Expect the result to be successful
    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
