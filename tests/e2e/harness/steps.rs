use std::time::Duration;

use super::assertions::Assertion;

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Writes
    Deploy {
        repo: String,
        path: String,
        content: Vec<u8>,
    },
    DeployRejected {
        repo: String,
        path: String,
    },
    DeleteItem {
        repo: String,
        path: String,
    },

    // Readers
    OpenBinary {
        repo: String,
        path: String,
    },
    CloseBinaries,

    // Filestore manipulation
    AgeBinaries {
        by: Duration,
    },
    CorruptBinary {
        repo: String,
        path: String,
    },

    // Maintenance
    Gc {
        dry_run: bool,
        aggressive: bool,
    },

    // Lifecycle
    Reopen,

    // Assertions
    Assert {
        assertion: Assertion,
    },
}
