//! Repository-qualified item paths.

use crate::error::{DepotError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one item across all repositories: a repository key plus a
/// path relative to that repository's root.
///
/// Paths are normalised on construction so that `a/b`, `/a/b/` and `a//b`
/// name the same item.
///
/// # Examples
///
/// ```
/// use depot_core::RepoPath;
///
/// let p = RepoPath::new("libs-release-local", "/org/acme/app/1.0/app-1.0.jar");
/// assert_eq!(p.path(), "org/acme/app/1.0/app-1.0.jar");
/// assert_eq!(p.to_string(), "libs-release-local:org/acme/app/1.0/app-1.0.jar");
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoPath {
    repo_key: String,
    path: String,
}

impl RepoPath {
    /// Creates a path inside `repo_key`.
    pub fn new(repo_key: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            repo_key: repo_key.into(),
            path: normalize(path.as_ref()),
        }
    }

    /// The root of a repository.
    pub fn root(repo_key: impl Into<String>) -> Self {
        Self::new(repo_key, "")
    }

    /// Returns the repository key.
    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    /// Returns the normalised relative path (no leading slash).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True when this is the repository root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment, empty for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// The containing folder, `None` for the root.
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Some(RepoPath::new(self.repo_key.clone(), parent))
    }
}

/// Rejects repository keys that cannot round-trip through the `repo:path`
/// form.
pub(crate) fn check_repo_key(repo_key: &str) -> Result<()> {
    if repo_key.is_empty() {
        return Err(DepotError::InvalidRepoPath("empty repository key".into()));
    }
    if repo_key.contains(':') {
        return Err(DepotError::InvalidRepoPath(format!(
            "repository key '{}' contains ':'",
            repo_key
        )));
    }
    Ok(())
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo_key, self.path)
    }
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPath({}:{})", self.repo_key, self.path)
    }
}

impl FromStr for RepoPath {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self> {
        let (repo_key, path) = s
            .split_once(':')
            .ok_or_else(|| DepotError::InvalidRepoPath(format!("missing ':' in '{}'", s)))?;
        if repo_key.is_empty() {
            return Err(DepotError::InvalidRepoPath(format!(
                "empty repository key in '{}'",
                s
            )));
        }
        Ok(RepoPath::new(repo_key, path))
    }
}
