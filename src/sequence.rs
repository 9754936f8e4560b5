// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit sequence construction.
//!
//! Builds the ordered list of commits a session walks through: both
//! endpoints resolved, ancestry validated, and the first-parent ancestry
//! path computed with the optional path filter applied. Construction is
//! deterministic for a given repository state; a stored sequence is never
//! recomputed implicitly, only when a subcommand explicitly rebuilds it.

use crate::backend::{Backend, BackendError, CommitId};

use tracing::debug;

/// A fully built walking sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltSequence {
    /// Resolved oldest endpoint; always `commits[0]`.
    pub first: CommitId,

    /// Resolved newest endpoint; always the final element of `commits`.
    pub last: CommitId,

    /// Ordered commit ids from `first` to `last`, inclusive.
    pub commits: Vec<CommitId>,
}

/// Build the walking sequence between two revision expressions.
///
/// # Errors
///
/// - Return [`BackendError::UnknownRevision`] through
///   [`SequenceError::Backend`] if either endpoint fails to resolve.
/// - Return [`SequenceError::NotAnAncestor`] if `first` is not reachable
///   from `last`.
/// - Return [`SequenceError::NoLinearPath`] if no single first-parent
///   lineage connects the endpoints.
pub fn build(
    backend: &impl Backend,
    first: &str,
    last: &str,
    path_filter: &[String],
) -> Result<BuiltSequence> {
    let first = backend.resolve_revision(first)?;
    let last = backend.resolve_revision(last)?;

    if !backend.is_ancestor(&first, &last)? {
        return Err(SequenceError::NotAnAncestor {
            first: first.to_string(),
            last: last.to_string(),
        });
    }

    let commits = backend.ancestry_path(&first, &last, path_filter)?;
    if commits.len() < 2 && first != last {
        return Err(SequenceError::NoLinearPath {
            first: first.to_string(),
            last: last.to_string(),
        });
    }
    debug!("built sequence of {} commits", commits.len());

    Ok(BuiltSequence {
        first,
        last,
        commits,
    })
}

/// All possible error types for sequence construction.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// `first` is not reachable from `last` through ancestry.
    #[error("{first} is not an ancestor of {last}")]
    NotAnAncestor { first: String, last: String },

    /// No single first-parent lineage connects the endpoints.
    #[error("no linear first-parent path connects {first} to {last}")]
    NoLinearPath { first: String, last: String },

    /// Backend query fails.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Friendly result alias :3
pub type Result<T, E = SequenceError> = std::result::Result<T, E>;
