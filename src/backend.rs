// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version-control backend adapter.
//!
//! The walker never talks to Git directly. Everything it needs from the
//! repository goes through the [`Backend`] trait: revision resolution,
//! ancestry queries, working tree status, commit metadata, and checkouts.
//! This keeps the walking logic testable against an in-memory fake, and
//! keeps all Git knowledge in one place.
//!
//! [`Git2Backend`] is the real implementation. Repository-object queries go
//! through libgit2, while working-tree movement and ancestry-path listings
//! shell out to the Git binary. Git's own rev-list already knows how to
//! compute a first-parent ancestry path with pathspec limiting, and
//! git-checkout handles detached checkouts with all of their safety checks,
//! so we delegate instead of reimplementing either.

use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::debug;

/// Absolute commit identifier.
///
/// Always a fully resolved id as produced by [`Backend::resolve_revision`],
/// never an abbreviation or a symbolic name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for CommitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CommitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Display for CommitId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.as_str())
    }
}

/// Display metadata for a single commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    pub short_id: String,
    pub subject: String,
}

/// Capability set the walker requires from the version-control backend.
pub trait Backend {
    /// Resolve a revision expression to an absolute commit id.
    ///
    /// # Errors
    ///
    /// - Return [`BackendError::UnknownRevision`] if the expression does not
    ///   resolve to a commit.
    fn resolve_revision(&self, spec: &str) -> Result<CommitId>;

    /// Ordered ancestry path from `first` to `last`, oldest to newest,
    /// inclusive of both endpoints.
    ///
    /// The path follows the first-parent line only, so merge commits stay
    /// collapsed to a single lineage. A non-empty `path_filter` keeps only
    /// commits touching a matching path, but both endpoints are always kept
    /// regardless of path match. When no first-parent ancestry path connects
    /// the endpoints, the result contains `first` alone.
    fn ancestry_path(
        &self,
        first: &CommitId,
        last: &CommitId,
        path_filter: &[String],
    ) -> Result<Vec<CommitId>>;

    /// Full first-parent lineage of `tip`, oldest to newest, ending at `tip`.
    fn lineage(&self, tip: &CommitId) -> Result<Vec<CommitId>>;

    /// Check whether `a` is reachable from `b` by following ancestry.
    fn is_ancestor(&self, a: &CommitId, b: &CommitId) -> Result<bool>;

    /// Check whether the working tree has no staged or unstaged
    /// modifications. Untracked files do not count as modifications.
    fn working_tree_clean(&self) -> Result<bool>;

    /// Move the workspace to `id` without attaching to any named branch.
    ///
    /// # Errors
    ///
    /// - Return [`BackendError::CheckoutBlocked`] if Git refuses the
    ///   checkout, e.g., local modifications would be overwritten.
    fn checkout_detached(&self, id: &CommitId) -> Result<()>;

    /// Move the workspace to an arbitrary revision or reference, attaching
    /// to it when it names a branch. Used to restore the session origin.
    fn checkout(&self, target: &str) -> Result<()>;

    /// Short id and subject line of a commit, for display.
    fn commit_summary(&self, id: &CommitId) -> Result<CommitSummary>;

    /// Commit the workspace currently points at.
    fn current_revision(&self) -> Result<CommitId>;

    /// Short branch name the workspace is attached to, if any.
    fn current_symbolic_ref(&self) -> Result<Option<String>>;
}

/// Backend implementation over libgit2 and the Git binary.
pub struct Git2Backend {
    repository: git2::Repository,
}

impl Git2Backend {
    /// Discover the repository containing `path`.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repository = git2::Repository::discover(path.as_ref())?;
        Ok(Self { repository })
    }

    /// Discover the repository containing the current working directory.
    pub fn discover_from_cwd() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::discover(cwd)
    }

    /// Absolute path to the repository's git directory.
    pub fn git_dir(&self) -> PathBuf {
        self.repository.path().to_path_buf()
    }

    fn workdir(&self) -> &Path {
        // Bare repositories have no working tree; fall back to the git dir
        // so gitcalls still resolve the repository.
        self.repository
            .workdir()
            .unwrap_or_else(|| self.repository.path())
    }

    fn oid(&self, id: &CommitId) -> Result<git2::Oid> {
        Ok(git2::Oid::from_str(id.as_str())?)
    }

    fn gitcall(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(self.workdir())
            .args(args)
            .output()?;
        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(BackendError::Syscall { message });
        }

        Ok(stdout)
    }

    fn rev_list(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<Vec<CommitId>> {
        let output = self.gitcall(args)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(CommitId::from)
            .collect())
    }
}

impl Backend for Git2Backend {
    fn resolve_revision(&self, spec: &str) -> Result<CommitId> {
        let object = self
            .repository
            .revparse_single(spec)
            .map_err(|source| BackendError::UnknownRevision {
                spec: spec.to_string(),
                source,
            })?;
        let commit = object
            .peel_to_commit()
            .map_err(|source| BackendError::UnknownRevision {
                spec: spec.to_string(),
                source,
            })?;

        Ok(CommitId::from(commit.id().to_string()))
    }

    fn ancestry_path(
        &self,
        first: &CommitId,
        last: &CommitId,
        path_filter: &[String],
    ) -> Result<Vec<CommitId>> {
        if first == last {
            return Ok(vec![first.clone()]);
        }

        let range = format!("{first}..{last}");
        let raw = self.rev_list([
            "rev-list",
            "--reverse",
            "--first-parent",
            "--ancestry-path",
            range.as_str(),
        ])?;
        debug!("raw ancestry path {first}..{last}: {} commits", raw.len());
        if raw.is_empty() {
            // INVARIANT: Reachable through general ancestry, but no
            // first-parent route; caller decides how to report it.
            return Ok(vec![first.clone()]);
        }

        let mut path = vec![first.clone()];
        if path_filter.is_empty() {
            path.extend(raw);
            return Ok(path);
        }

        let mut args = vec![
            "rev-list".to_string(),
            "--reverse".to_string(),
            "--first-parent".to_string(),
            "--ancestry-path".to_string(),
            range,
            "--".to_string(),
        ];
        args.extend(path_filter.iter().cloned());
        let touching = self.rev_list(args)?;

        // Endpoints are always kept, matched or not.
        let tip = raw.len() - 1;
        for (index, id) in raw.into_iter().enumerate() {
            if index == tip || touching.contains(&id) {
                path.push(id);
            }
        }

        Ok(path)
    }

    fn lineage(&self, tip: &CommitId) -> Result<Vec<CommitId>> {
        self.rev_list(["rev-list", "--reverse", "--first-parent", tip.as_str()])
    }

    fn is_ancestor(&self, a: &CommitId, b: &CommitId) -> Result<bool> {
        if a == b {
            return Ok(true);
        }

        Ok(self
            .repository
            .graph_descendant_of(self.oid(b)?, self.oid(a)?)?)
    }

    fn working_tree_clean(&self) -> Result<bool> {
        let mut options = git2::StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self.repository.statuses(Some(&mut options))?;

        Ok(statuses.is_empty())
    }

    fn checkout_detached(&self, id: &CommitId) -> Result<()> {
        self.gitcall(["checkout", "--detach", id.as_str()])
            .map_err(|error| blocked(id.as_str(), error))?;

        Ok(())
    }

    fn checkout(&self, target: &str) -> Result<()> {
        self.gitcall(["checkout", target])
            .map_err(|error| blocked(target, error))?;

        Ok(())
    }

    fn commit_summary(&self, id: &CommitId) -> Result<CommitSummary> {
        let oid = self.oid(id)?;
        let commit = self.repository.find_commit(oid)?;
        let short_id = self
            .repository
            .find_object(oid, None)?
            .short_id()?
            .as_str()
            .unwrap_or(id.as_str())
            .to_string();
        let subject = commit.summary().unwrap_or_default().to_string();

        Ok(CommitSummary { short_id, subject })
    }

    fn current_revision(&self) -> Result<CommitId> {
        let commit = self.repository.head()?.peel_to_commit()?;
        Ok(CommitId::from(commit.id().to_string()))
    }

    fn current_symbolic_ref(&self) -> Result<Option<String>> {
        let head = self.repository.find_reference("HEAD")?;
        let target = head.symbolic_target().map(|name| {
            name.strip_prefix("refs/heads/")
                .unwrap_or(name)
                .to_string()
        });

        Ok(target)
    }
}

fn blocked(target: &str, error: BackendError) -> BackendError {
    match error {
        BackendError::Syscall { message } => BackendError::CheckoutBlocked {
            target: target.to_string(),
            message,
        },
        other => other,
    }
}

/// All possible error types for backend interaction.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Revision expression does not resolve to a commit.
    #[error("cannot resolve revision '{spec}'")]
    UnknownRevision {
        spec: String,
        #[source]
        source: git2::Error,
    },

    /// Git refused to move the working tree.
    #[error("cannot check out '{target}': {message}")]
    CheckoutBlocked { target: String, message: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Invoked Git binary exits non-zero.
    #[error("git invocation failed: {message}")]
    Syscall { message: String },

    /// Spawning the Git binary fails outright.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = BackendError> = std::result::Result<T, E>;
