use anyhow::Result;
use depot_core::Depot;

/// Declarative assertions on depot state
pub enum Assertion {
    // Items
    ItemExists {
        repo: String,
        path: String,
    },
    ItemMissing {
        repo: String,
        path: String,
    },
    ItemContent {
        repo: String,
        path: String,
        content: Vec<u8>,
    },

    // Filestore
    BinaryCount(usize),

    // Resolution
    SearchOrder {
        virtual_key: String,
        path: Option<String>,
        keys: Vec<String>,
    },
    HasCycle {
        virtual_key: String,
        expected: bool,
    },
    FoundIn {
        virtual_key: String,
        path: String,
        repo: Option<String>,
    },

    // Last GC run
    GcDeleted(usize),
    GcPinned(usize),
    GcRecent(usize),

    // Verification
    VerifyClean,
    VerifyCorrupted(usize),

    // Custom check against the open depot
    Custom(Box<dyn Fn(&Depot) -> Result<()>>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemExists { repo, path } => write!(f, "ItemExists({}:{})", repo, path),
            Self::ItemMissing { repo, path } => write!(f, "ItemMissing({}:{})", repo, path),
            Self::ItemContent { repo, path, content } => {
                write!(f, "ItemContent({}:{}, {} bytes)", repo, path, content.len())
            }
            Self::BinaryCount(n) => write!(f, "BinaryCount({})", n),
            Self::SearchOrder {
                virtual_key,
                path,
                keys,
            } => write!(
                f,
                "SearchOrder {{ virtual_key: {:?}, path: {:?}, keys: {:?} }}",
                virtual_key, path, keys
            ),
            Self::HasCycle {
                virtual_key,
                expected,
            } => write!(f, "HasCycle({:?}, {})", virtual_key, expected),
            Self::FoundIn {
                virtual_key,
                path,
                repo,
            } => write!(
                f,
                "FoundIn {{ virtual_key: {:?}, path: {:?}, repo: {:?} }}",
                virtual_key, path, repo
            ),
            Self::GcDeleted(n) => write!(f, "GcDeleted({})", n),
            Self::GcPinned(n) => write!(f, "GcPinned({})", n),
            Self::GcRecent(n) => write!(f, "GcRecent({})", n),
            Self::VerifyClean => write!(f, "VerifyClean"),
            Self::VerifyCorrupted(n) => write!(f, "VerifyCorrupted({})", n),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
