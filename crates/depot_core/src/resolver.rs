//! Flattening of virtual repositories into a real-repository search path.

use crate::descriptor::{
    LocalRepoDescriptor, RealRepo, RemoteRepoDescriptor, RepoDescriptor, RepoGraph,
    VirtualRepoDescriptor,
};
use crate::error::{DepotError, Result};
use std::collections::HashSet;
use std::slice;
use tracing::{debug, warn};

/// The search path of one virtual repository.
///
/// Built per call by walking the member graph depth-first in declared order.
/// Local repositories are searched before remote ones; within each group a
/// repository keeps the position of its first depth-first encounter and
/// appears only once.
#[derive(Debug, Clone)]
pub struct VirtualRepoResolver<'g> {
    root: &'g VirtualRepoDescriptor,
    locals: Vec<&'g LocalRepoDescriptor>,
    remotes: Vec<&'g RemoteRepoDescriptor>,
    virtuals: Vec<&'g VirtualRepoDescriptor>,
    has_cycle: bool,
}

/// One level of the explicit DFS stack.
struct Frame<'g> {
    key: &'g str,
    members: slice::Iter<'g, String>,
}

impl<'g> VirtualRepoResolver<'g> {
    /// Resolves `virtual_key` against `graph`.
    ///
    /// Each virtual repository is expanded at most once. Reaching one again,
    /// whether through a back edge or a second branch, skips it and sets
    /// [`has_cycle`](Self::has_cycle).
    ///
    /// # Errors
    ///
    /// Returns `UnknownRepository` when the root or any member key is not in
    /// the graph, and `NotVirtual` when the root is a real repository.
    pub fn resolve(graph: &'g RepoGraph, virtual_key: &str) -> Result<Self> {
        let root = match graph.get(virtual_key) {
            Some(RepoDescriptor::Virtual(v)) => v,
            Some(_) => return Err(DepotError::NotVirtual(virtual_key.to_string())),
            None => return Err(DepotError::UnknownRepository(virtual_key.to_string())),
        };

        let mut locals = Vec::new();
        let mut remotes = Vec::new();
        let mut virtuals = vec![root];
        let mut seen_real: HashSet<&str> = HashSet::new();
        let mut expanded: HashSet<&str> = HashSet::from([root.key.as_str()]);
        let mut has_cycle = false;

        let mut stack = vec![Frame {
            key: &root.key,
            members: root.members.iter(),
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(member_key) = frame.members.next() else {
                stack.pop();
                continue;
            };

            let member = graph.get(member_key).ok_or_else(|| {
                DepotError::UnknownRepository(format!(
                    "{} (member of {})",
                    member_key, frame.key
                ))
            })?;

            match member {
                RepoDescriptor::Local(local) => {
                    if seen_real.insert(local.key.as_str()) {
                        locals.push(local);
                    }
                }
                RepoDescriptor::Remote(remote) => {
                    if seen_real.insert(remote.key.as_str()) {
                        remotes.push(remote);
                    }
                }
                RepoDescriptor::Virtual(nested) => {
                    let key = nested.key.as_str();
                    if expanded.insert(key) {
                        virtuals.push(nested);
                        stack.push(Frame {
                            key,
                            members: nested.members.iter(),
                        });
                    } else {
                        warn!(
                            virtual_repo = root.key.as_str(),
                            via = frame.key,
                            member = key,
                            "virtual repository reached twice, edge ignored"
                        );
                        has_cycle = true;
                    }
                }
            }
        }

        debug!(
            virtual_repo = root.key.as_str(),
            locals = locals.len(),
            remotes = remotes.len(),
            has_cycle,
            "resolved virtual repository"
        );

        Ok(Self {
            root,
            locals,
            remotes,
            virtuals,
            has_cycle,
        })
    }

    /// The virtual repository that was resolved.
    pub fn root(&self) -> &'g VirtualRepoDescriptor {
        self.root
    }

    /// Local repositories in search order.
    pub fn local_repos(&self) -> &[&'g LocalRepoDescriptor] {
        &self.locals
    }

    /// Remote repositories in search order.
    pub fn remote_repos(&self) -> &[&'g RemoteRepoDescriptor] {
        &self.remotes
    }

    /// Every virtual repository traversed, root first, in visit order.
    pub fn virtual_repos(&self) -> &[&'g VirtualRepoDescriptor] {
        &self.virtuals
    }

    /// All real repositories: locals first, then remotes.
    pub fn ordered_repos(&self) -> Vec<RealRepo<'g>> {
        self.locals
            .iter()
            .map(|d| RealRepo::Local(*d))
            .chain(self.remotes.iter().map(|d| RealRepo::Remote(*d)))
            .collect()
    }

    /// Keys of [`ordered_repos`](Self::ordered_repos).
    pub fn ordered_keys(&self) -> Vec<&'g str> {
        self.ordered_repos().iter().map(|r| r.key()).collect()
    }

    /// Whether a cycle was found (and broken) while resolving.
    pub fn has_cycle(&self) -> bool {
        self.has_cycle
    }

    /// Repositories to consult for `path`: the ordered repositories whose
    /// patterns accept the path, minus offline remotes.
    pub fn search_order(&self, path: &str) -> Vec<RealRepo<'g>> {
        self.ordered_repos()
            .into_iter()
            .filter(|repo| !repo.is_offline() && repo.accepts(path))
            .collect()
    }
}
