//! Repository descriptors and the repository graph.
//!
//! Descriptors are what `[[repositories]]` entries in `depot.toml` deserialize
//! into. Virtual repositories name their members by key, and the
//! [`RepoGraph`] registry resolves those keys, so a virtual repository may
//! reference itself or another virtual repository that references it back.

use crate::error::{DepotError, Result};
use crate::resolver::VirtualRepoResolver;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A repository that stores deployed artifacts on this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRepoDescriptor {
    /// Unique repository key.
    pub key: String,

    /// Free-form description shown to administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Glob patterns a path must match to be served (empty = everything).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    /// Glob patterns that exclude a path even when included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

/// A repository proxying an upstream URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepoDescriptor {
    /// Unique repository key.
    pub key: String,

    /// Free-form description shown to administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Upstream base URL.
    pub url: String,

    /// Offline remotes are never consulted for lookups.
    #[serde(default)]
    pub offline: bool,

    /// Glob patterns a path must match to be served (empty = everything).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    /// Glob patterns that exclude a path even when included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

/// An aggregate that dispatches lookups to an ordered list of members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualRepoDescriptor {
    /// Unique repository key.
    pub key: String,

    /// Free-form description shown to administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Member repository keys in lookup order. Members may be virtual.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Any configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RepoDescriptor {
    /// Local repository.
    Local(LocalRepoDescriptor),
    /// Remote (proxy) repository.
    Remote(RemoteRepoDescriptor),
    /// Virtual (aggregate) repository.
    Virtual(VirtualRepoDescriptor),
}

impl RepoDescriptor {
    /// Returns the repository key.
    pub fn key(&self) -> &str {
        match self {
            Self::Local(d) => &d.key,
            Self::Remote(d) => &d.key,
            Self::Virtual(d) => &d.key,
        }
    }

    /// True for local and remote repositories.
    pub fn is_real(&self) -> bool {
        !matches!(self, Self::Virtual(_))
    }

    /// Short type name used in listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
            Self::Virtual(_) => "virtual",
        }
    }

    fn patterns(&self) -> impl Iterator<Item = &String> {
        let (includes, excludes): (&[String], &[String]) = match self {
            Self::Local(d) => (d.includes.as_slice(), d.excludes.as_slice()),
            Self::Remote(d) => (d.includes.as_slice(), d.excludes.as_slice()),
            Self::Virtual(_) => (&[], &[]),
        };
        includes.iter().chain(excludes.iter())
    }
}

/// A leaf of the repository graph: something that can actually hold content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealRepo<'g> {
    /// Local repository.
    Local(&'g LocalRepoDescriptor),
    /// Remote repository.
    Remote(&'g RemoteRepoDescriptor),
}

impl<'g> RealRepo<'g> {
    /// Returns the repository key.
    pub fn key(&self) -> &'g str {
        match self {
            Self::Local(d) => &d.key,
            Self::Remote(d) => &d.key,
        }
    }

    /// True for local repositories.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// True for remote repositories that are marked offline.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Remote(d) if d.offline)
    }

    /// Whether this repository's include/exclude patterns admit `path`.
    pub fn accepts(&self, path: &str) -> bool {
        let (includes, excludes) = match self {
            Self::Local(d) => (&d.includes, &d.excludes),
            Self::Remote(d) => (&d.includes, &d.excludes),
        };
        path_accepted(includes, excludes, path)
    }
}

fn path_accepted(includes: &[String], excludes: &[String], path: &str) -> bool {
    let matches = |pattern: &String| {
        Pattern::new(pattern)
            .map(|p| p.matches_with(path, MATCH_OPTIONS))
            .unwrap_or(false)
    };
    let included = includes.is_empty() || includes.iter().any(matches);
    included && !excludes.iter().any(matches)
}

/// Registry of every configured repository, keyed by repository key.
///
/// # Examples
///
/// ```
/// use depot_core::{LocalRepoDescriptor, RepoDescriptor, RepoGraph, VirtualRepoDescriptor};
///
/// let graph = RepoGraph::new(vec![
///     RepoDescriptor::Local(LocalRepoDescriptor {
///         key: "local1".into(),
///         description: None,
///         includes: vec![],
///         excludes: vec![],
///     }),
///     RepoDescriptor::Virtual(VirtualRepoDescriptor {
///         key: "all".into(),
///         description: None,
///         members: vec!["local1".into(), "all".into()],
///     }),
/// ])
/// .unwrap();
///
/// let resolved = graph.resolve("all").unwrap();
/// assert!(resolved.has_cycle());
/// assert_eq!(resolved.ordered_keys(), vec!["local1"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RepoGraph {
    repos: BTreeMap<String, RepoDescriptor>,
}

impl RepoGraph {
    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRepository` when two descriptors share a key,
    /// `Config` for an empty key or one containing `:`, and `InvalidPattern`
    /// for a malformed include/exclude pattern.
    pub fn new(descriptors: impl IntoIterator<Item = RepoDescriptor>) -> Result<Self> {
        let mut repos = BTreeMap::new();

        for descriptor in descriptors {
            let key = descriptor.key().to_string();
            if key.is_empty() {
                return Err(DepotError::Config("repository key must not be empty".into()));
            }
            if key.contains(':') {
                return Err(DepotError::Config(format!(
                    "repository key '{}' must not contain ':'",
                    key
                )));
            }
            for pattern in descriptor.patterns() {
                Pattern::new(pattern).map_err(|e| DepotError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.msg.to_string(),
                })?;
            }
            if repos.insert(key.clone(), descriptor).is_some() {
                return Err(DepotError::DuplicateRepository(key));
            }
        }

        debug!(repositories = repos.len(), "built repository graph");
        Ok(Self { repos })
    }

    /// Looks up a descriptor.
    pub fn get(&self, key: &str) -> Option<&RepoDescriptor> {
        self.repos.get(key)
    }

    /// Iterates over all descriptors in key order.
    pub fn descriptors(&self) -> impl Iterator<Item = &RepoDescriptor> {
        self.repos.values()
    }

    /// Number of configured repositories.
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    /// True when nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Resolves a virtual repository into its search path.
    ///
    /// Shorthand for [`VirtualRepoResolver::resolve`].
    pub fn resolve(&self, virtual_key: &str) -> Result<VirtualRepoResolver<'_>> {
        VirtualRepoResolver::resolve(self, virtual_key)
    }

    /// Resolves every virtual repository.
    ///
    /// Returns the keys of virtual repositories whose member graph contains a
    /// cycle. Unknown member keys fail the whole validation.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut cyclic = Vec::new();
        for descriptor in self.repos.values() {
            if let RepoDescriptor::Virtual(v) = descriptor {
                if self.resolve(&v.key)?.has_cycle() {
                    cyclic.push(v.key.clone());
                }
            }
        }
        Ok(cyclic)
    }
}
