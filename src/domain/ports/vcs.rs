//! VCS port - source-control primitives the orchestrator relies on.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("patch does not apply: {0}")]
    PatchRejected(String),

    #[error("cannot resolve ref `{0}`")]
    UnknownRef(String),

    #[error("vcs io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VcsResult<T> = Result<T, VcsError>;

/// Proof of a temporary checkout. Hand it back to [`VcsProvider::restore`]
/// to return to the prior ref with pending changes reinstated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a checkout must be restored"]
pub struct Checkout {
    /// Ref that was checked out.
    pub target: String,
    /// Ref (branch name or commit) to return to.
    pub previous: String,
    /// Provider-specific handle for set-aside pending changes.
    pub stash: Option<String>,
}

/// Trait for version-control backends.
///
/// Implementations must not touch the caller's pending changes except
/// through `apply_diff`, `revert_diff`, `discard_changes` and the
/// checkout/restore pair.
#[async_trait]
pub trait VcsProvider: Send + Sync {
    /// Every uncommitted change (tracked and untracked) as an applyable diff
    /// against HEAD. Empty when the tree is clean.
    async fn diff_working_tree(&self) -> VcsResult<Vec<u8>>;

    async fn apply_diff(&self, patch: &[u8]) -> VcsResult<()>;

    /// Reverse-apply a diff previously applied with `apply_diff`.
    async fn revert_diff(&self, patch: &[u8]) -> VcsResult<()>;

    /// Reset the working tree to the committed HEAD.
    async fn discard_changes(&self) -> VcsResult<()>;

    /// Set pending changes aside and check out `target`.
    async fn checkout(&self, target: &str) -> VcsResult<Checkout>;

    async fn restore(&self, checkout: Checkout) -> VcsResult<()>;

    /// Tip of the current branch (its upstream when one is configured).
    async fn current_branch_head(&self) -> VcsResult<String>;

    /// Merge base of HEAD with the configured upstream base ref.
    async fn upstream_base(&self) -> VcsResult<String>;

    /// Resolve a ref to a commit id.
    async fn resolve(&self, reference: &str) -> VcsResult<String>;
}
