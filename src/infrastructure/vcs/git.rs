//! Git implementation of the VCS port.
//!
//! Shells out to `git` in the repository root. The working-tree diff is
//! built in a throw-away index so the caller's staging area is never read
//! or written while capturing.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, instrument, warn};

use crate::domain::ports::{Checkout, VcsError, VcsProvider, VcsResult};

const PROBE_STASH_MESSAGE: &str = "mender: pending changes set aside for reference probe";

pub struct GitVcs {
    root: PathBuf,
    upstream_base: String,
    /// State dir relative to the root, when it lives inside the work tree.
    excluded: Option<String>,
}

impl GitVcs {
    pub fn new(root: impl Into<PathBuf>, upstream_base: impl Into<String>, state_dir: &Path) -> Self {
        let root = root.into();
        let excluded = state_dir
            .strip_prefix(&root)
            .ok()
            .or_else(|| state_dir.is_relative().then_some(state_dir))
            .filter(|rel| !rel.starts_with(".git"))
            .map(|rel| rel.to_string_lossy().into_owned());
        Self {
            root,
            upstream_base: upstream_base.into(),
            excluded,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pathspec(&self) -> Vec<String> {
        let mut spec = vec!["--".to_string(), ".".to_string()];
        if let Some(rel) = &self.excluded {
            spec.push(format!(":(exclude){rel}"));
        }
        spec
    }

    async fn exec(
        &self,
        args: &[&str],
        input: Option<&[u8]>,
        index_file: Option<&Path>,
    ) -> VcsResult<Output> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(index) = index_file {
            cmd.env("GIT_INDEX_FILE", index);
        }

        let mut child = cmd.spawn()?;
        if let Some(bytes) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes).await?;
            }
        }
        Ok(child.wait_with_output().await?)
    }

    /// Run git and return stdout, failing on a non-zero exit.
    async fn git(&self, args: &[&str]) -> VcsResult<Vec<u8>> {
        let output = self.exec(args, None, None).await?;
        check(args, output)
    }

    async fn git_line(&self, args: &[&str]) -> VcsResult<String> {
        let out = self.git(args).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    async fn succeeds(&self, args: &[&str]) -> VcsResult<bool> {
        Ok(self.exec(args, None, None).await?.status.success())
    }

    async fn apply(&self, patch: &[u8], reverse: bool) -> VcsResult<()> {
        let mut args = vec!["apply", "--binary", "--whitespace=nowarn"];
        if reverse {
            args.push("--reverse");
        }
        args.push("-");
        let output = self.exec(&args, Some(patch), None).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(reverse, %stderr, "git apply rejected patch");
        Err(VcsError::PatchRejected(stderr))
    }

    async fn is_dirty(&self) -> VcsResult<bool> {
        let mut args = vec!["status", "--porcelain", "--untracked-files=all"];
        let spec = self.pathspec();
        args.extend(spec.iter().map(String::as_str));
        Ok(!self.git(&args).await?.is_empty())
    }

    async fn stash_top(&self) -> VcsResult<String> {
        self.git_line(&["rev-parse", "--verify", "stash@{0}"]).await
    }
}

fn check(args: &[&str], output: Output) -> VcsResult<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    let command = format!("git {}", args.join(" "));
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    error!(%command, %stderr, "git command failed");
    Err(VcsError::CommandFailed { command, stderr })
}

#[async_trait]
impl VcsProvider for GitVcs {
    #[instrument(skip(self))]
    async fn diff_working_tree(&self) -> VcsResult<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let index = scratch.path().join("index");

        check(
            &["read-tree", "HEAD"],
            self.exec(&["read-tree", "HEAD"], None, Some(&index)).await?,
        )?;
        let mut add = vec!["add", "--all"];
        let spec = self.pathspec();
        add.extend(spec.iter().map(String::as_str));
        check(&add, self.exec(&add, None, Some(&index)).await?)?;

        let diff = ["diff", "--cached", "--binary", "--no-color", "--no-ext-diff", "HEAD"];
        let payload = check(&diff, self.exec(&diff, None, Some(&index)).await?)?;
        debug!(bytes = payload.len(), "captured working tree diff");
        Ok(payload)
    }

    async fn apply_diff(&self, patch: &[u8]) -> VcsResult<()> {
        self.apply(patch, false).await
    }

    async fn revert_diff(&self, patch: &[u8]) -> VcsResult<()> {
        self.apply(patch, true).await
    }

    #[instrument(skip(self))]
    async fn discard_changes(&self) -> VcsResult<()> {
        self.git(&["reset", "--hard", "--quiet", "HEAD"]).await?;
        let exclude = self.excluded.as_ref().map(|rel| format!("--exclude={rel}"));
        let mut clean = vec!["clean", "-fd", "--quiet"];
        if let Some(flag) = &exclude {
            clean.push(flag);
        }
        self.git(&clean).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn checkout(&self, target: &str) -> VcsResult<Checkout> {
        let previous = match self.git_line(&["symbolic-ref", "--short", "-q", "HEAD"]).await {
            Ok(branch) if !branch.is_empty() => branch,
            _ => self.git_line(&["rev-parse", "HEAD"]).await?,
        };

        let stash = if self.is_dirty().await? {
            let mut push = vec!["stash", "push", "--include-untracked", "--quiet", "-m", PROBE_STASH_MESSAGE];
            let spec = self.pathspec();
            push.extend(spec.iter().map(String::as_str));
            self.git(&push).await?;
            Some(self.stash_top().await?)
        } else {
            None
        };

        if let Err(e) = self.git(&["checkout", "--quiet", "--detach", target]).await {
            if stash.is_some() {
                self.git(&["stash", "pop", "--quiet"]).await?;
            }
            return Err(e);
        }
        debug!(%previous, stashed = stash.is_some(), "checked out");
        Ok(Checkout {
            target: target.to_string(),
            previous,
            stash,
        })
    }

    #[instrument(skip(self), fields(previous = %checkout.previous))]
    async fn restore(&self, checkout: Checkout) -> VcsResult<()> {
        // leftovers from the checked-out run must not reach the live tree or collide with the stash pop
        self.discard_changes().await?;
        if self
            .succeeds(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{}", checkout.previous)])
            .await?
        {
            self.git(&["checkout", "--quiet", &checkout.previous]).await?;
        } else {
            self.git(&["checkout", "--quiet", "--detach", &checkout.previous]).await?;
        }

        if let Some(expected) = checkout.stash {
            let top = self.stash_top().await?;
            if top != expected {
                return Err(VcsError::CommandFailed {
                    command: "git stash pop".to_string(),
                    stderr: format!("stash@{{0}} is {top}, expected {expected}"),
                });
            }
            self.git(&["stash", "pop", "--quiet"]).await?;
        }
        Ok(())
    }

    async fn current_branch_head(&self) -> VcsResult<String> {
        match self
            .git_line(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"])
            .await
        {
            Ok(upstream) if !upstream.is_empty() => Ok(upstream),
            _ => Ok("HEAD".to_string()),
        }
    }

    async fn upstream_base(&self) -> VcsResult<String> {
        self.git_line(&["merge-base", "HEAD", &self.upstream_base])
            .await
            .map_err(|_| VcsError::UnknownRef(self.upstream_base.clone()))
    }

    async fn resolve(&self, reference: &str) -> VcsResult<String> {
        let spec = format!("{reference}^{{commit}}");
        self.git_line(&["rev-parse", "--verify", "--quiet", &spec])
            .await
            .map_err(|_| VcsError::UnknownRef(reference.to_string()))
    }
}
