//! In-memory VCS for tests and dry runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::ports::{Checkout, VcsError, VcsProvider, VcsResult};

/// File path to contents.
pub type Tree = BTreeMap<String, String>;

/// One file-level change. `None` means the file does not exist on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    pub path: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Encode file-level changes in the in-memory diff format.
pub fn make_patch<'a>(
    changes: impl IntoIterator<Item = (&'a str, Option<&'a str>, Option<&'a str>)>,
) -> Vec<u8> {
    let patches: Vec<FilePatch> = changes
        .into_iter()
        .map(|(path, before, after)| FilePatch {
            path: path.to_string(),
            before: before.map(str::to_string),
            after: after.map(str::to_string),
        })
        .collect();
    if patches.is_empty() {
        return Vec::new();
    }
    serde_json::to_vec(&patches).unwrap_or_default()
}

fn parse_patch(patch: &[u8]) -> VcsResult<Vec<FilePatch>> {
    serde_json::from_slice(patch).map_err(|e| VcsError::PatchRejected(e.to_string()))
}

#[derive(Debug, Default)]
struct State {
    commits: HashMap<String, Tree>,
    head: String,
    tree: Tree,
    stashes: Vec<Tree>,
    refs: HashMap<String, String>,
    branch_head: Option<String>,
    upstream_base: Option<String>,
    fail_discard: bool,
    next_commit: usize,
    mutations: usize,
    checkouts: usize,
}

impl State {
    fn head_tree(&self) -> Tree {
        self.commits.get(&self.head).cloned().unwrap_or_default()
    }

    fn resolve(&self, reference: &str) -> VcsResult<String> {
        if reference == "HEAD" {
            return Ok(self.head.clone());
        }
        if self.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        self.refs
            .get(reference)
            .cloned()
            .ok_or_else(|| VcsError::UnknownRef(reference.to_string()))
    }

    fn apply(&mut self, patches: &[FilePatch], reverse: bool) -> VcsResult<()> {
        for p in patches {
            let expect = if reverse { &p.after } else { &p.before };
            if self.tree.get(&p.path) != expect.as_ref() {
                return Err(VcsError::PatchRejected(format!(
                    "{}: working tree does not match patch preimage",
                    p.path
                )));
            }
        }
        for p in patches {
            let target = if reverse { &p.before } else { &p.after };
            match target {
                Some(content) => {
                    self.tree.insert(p.path.clone(), content.clone());
                }
                None => {
                    self.tree.remove(&p.path);
                }
            }
        }
        self.mutations += 1;
        Ok(())
    }
}

/// Deterministic [`VcsProvider`] over an in-memory commit graph.
///
/// The diff format is JSON file-level replacement, produced by
/// [`make_patch`] or [`VcsProvider::diff_working_tree`].
#[derive(Debug)]
pub struct InMemoryVcs {
    state: Mutex<State>,
}

impl InMemoryVcs {
    /// Repository with one commit holding `files`, checked out and clean.
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let vcs = Self {
            state: Mutex::new(State::default()),
        };
        let tree: Tree = files
            .into_iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        let id = vcs.commit_tree(tree.clone());
        let mut state = vcs.lock();
        state.head = id;
        state.tree = tree;
        drop(state);
        vcs
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a commit without moving HEAD. Returns its id.
    pub fn commit_tree(&self, tree: Tree) -> String {
        let mut state = self.lock();
        state.next_commit += 1;
        let id = format!("c{:03}{}", state.next_commit, "0".repeat(36));
        state.commits.insert(id.clone(), tree);
        id
    }

    /// Commit the current working tree and move HEAD to it.
    pub fn commit_working_tree(&self) -> String {
        let tree = self.tree();
        let id = self.commit_tree(tree);
        self.lock().head.clone_from(&id);
        id
    }

    pub fn set_ref(&self, name: &str, commit: &str) {
        self.lock().refs.insert(name.to_string(), commit.to_string());
    }

    /// Upstream tip reported by `current_branch_head`. HEAD when unset.
    pub fn set_branch_head(&self, commit: Option<&str>) {
        self.lock().branch_head = commit.map(str::to_string);
    }

    /// Merge base reported by `upstream_base`. Unresolvable when unset.
    pub fn set_upstream_base(&self, commit: Option<&str>) {
        self.lock().upstream_base = commit.map(str::to_string);
    }

    /// Make `discard_changes` fail, which breaks snapshot restore.
    pub fn set_fail_discard(&self, fail: bool) {
        self.lock().fail_discard = fail;
    }

    pub fn write(&self, path: &str, content: &str) {
        self.lock().tree.insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.lock().tree.remove(path);
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.lock().tree.get(path).cloned()
    }

    pub fn tree(&self) -> Tree {
        self.lock().tree.clone()
    }

    pub fn head(&self) -> String {
        self.lock().head.clone()
    }

    /// Applies, reverts and discards performed so far.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    pub fn checkout_count(&self) -> usize {
        self.lock().checkouts
    }

    pub fn stash_depth(&self) -> usize {
        self.lock().stashes.len()
    }
}

#[async_trait]
impl VcsProvider for InMemoryVcs {
    async fn diff_working_tree(&self) -> VcsResult<Vec<u8>> {
        let state = self.lock();
        let base = state.head_tree();
        let mut changes = Vec::new();
        for (path, content) in &state.tree {
            if base.get(path) != Some(content) {
                changes.push((path.as_str(), base.get(path).map(String::as_str), Some(content.as_str())));
            }
        }
        for (path, content) in &base {
            if !state.tree.contains_key(path) {
                changes.push((path.as_str(), Some(content.as_str()), None));
            }
        }
        Ok(make_patch(changes))
    }

    async fn apply_diff(&self, patch: &[u8]) -> VcsResult<()> {
        let patches = parse_patch(patch)?;
        self.lock().apply(&patches, false)
    }

    async fn revert_diff(&self, patch: &[u8]) -> VcsResult<()> {
        let patches = parse_patch(patch)?;
        self.lock().apply(&patches, true)
    }

    async fn discard_changes(&self) -> VcsResult<()> {
        let mut state = self.lock();
        if state.fail_discard {
            return Err(VcsError::CommandFailed {
                command: "discard".to_string(),
                stderr: "index.lock exists".to_string(),
            });
        }
        state.tree = state.head_tree();
        state.mutations += 1;
        Ok(())
    }

    async fn checkout(&self, target: &str) -> VcsResult<Checkout> {
        let mut state = self.lock();
        let commit = state.resolve(target)?;
        let previous = state.head.clone();
        let stash = if state.tree == state.head_tree() {
            None
        } else {
            let pending = state.tree.clone();
            state.stashes.push(pending);
            Some(format!("stash@{{{}}}", state.stashes.len() - 1))
        };
        state.tree = state.commits.get(&commit).cloned().unwrap_or_default();
        state.head = commit;
        state.checkouts += 1;
        Ok(Checkout {
            target: target.to_string(),
            previous,
            stash,
        })
    }

    async fn restore(&self, checkout: Checkout) -> VcsResult<()> {
        let mut state = self.lock();
        let previous = state.resolve(&checkout.previous)?;
        state.head = previous;
        state.tree = state.head_tree();
        if checkout.stash.is_some() {
            let pending = state.stashes.pop().ok_or_else(|| VcsError::CommandFailed {
                command: "stash pop".to_string(),
                stderr: "no stash entries".to_string(),
            })?;
            state.tree = pending;
        }
        Ok(())
    }

    async fn current_branch_head(&self) -> VcsResult<String> {
        let state = self.lock();
        Ok(state.branch_head.clone().unwrap_or_else(|| state.head.clone()))
    }

    async fn upstream_base(&self) -> VcsResult<String> {
        self.lock()
            .upstream_base
            .clone()
            .ok_or_else(|| VcsError::UnknownRef("upstream base".to_string()))
    }

    async fn resolve(&self, reference: &str) -> VcsResult<String> {
        self.lock().resolve(reference)
    }
}
