// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Walker state machine.
//!
//! Each subcommand of git-iter is a transition function over the persisted
//! [`Session`]: `start` builds a fresh sequence, `first`/`last` move the
//! endpoints and invalidate it, `next`/`prev` step the workspace through it,
//! `reset` restores the origin and drops all state, and `run` drives the
//! whole sequence under an external command.
//!
//! # Session States
//!
//! A session is always in one of four states (see
//! [`WalkState`](crate::session::WalkState)):
//!
//! - __NoSession__: nothing persisted yet.
//! - __NoSequence__: endpoints recorded, sequence stale or missing.
//! - __Ready__: sequence built, nothing checked out yet.
//! - __Positioned(i)__: workspace detached at sequence index `i`.
//!
//! Transitions never repair partial state silently. A stale sequence is only
//! rebuilt when a stepping subcommand explicitly needs it, and every backend
//! failure surfaces immediately. The only condition that blocks progress
//! without correction is a dirty working tree; git-iter never stashes on the
//! user's behalf.
//!
//! # Walking Order
//!
//! Sequences run oldest to newest. `next` moves toward `last`, `prev` moves
//! toward `first`, and both report reaching a boundary as success rather
//! than as an error, so shell loops around them terminate cleanly.

use crate::{
    backend::{Backend, BackendError, CommitId},
    sequence,
    session::Session,
    store::{SessionStore, StoreError},
};

use std::{ffi::OsString, process::Command};
use tracing::{error, info, instrument, warn};

/// Walker over a linear commit sequence.
///
/// Owns the backend it inspects and the store its session persists in. All
/// walking logic lives here; the binary only parses arguments and dispatches.
pub struct Walker<B: Backend> {
    backend: B,
    store: SessionStore,
}

impl<B: Backend> Walker<B> {
    /// Construct new walker.
    pub fn new(backend: B, store: SessionStore) -> Self {
        Self { backend, store }
    }

    /// Start a fresh session walking from `first` to `last`.
    ///
    /// `last` defaults to the current revision. The sequence is built
    /// eagerly so endpoint mistakes surface immediately, but nothing is
    /// checked out until the first `next`.
    #[instrument(skip(self, path_filter), level = "debug")]
    pub fn start(&self, first: &str, last: Option<&str>, path_filter: Vec<String>) -> Result<()> {
        self.require_clean()?;

        let built = sequence::build(
            &self.backend,
            first,
            last.unwrap_or("HEAD"),
            &path_filter,
        )?;
        let session = Session {
            origin: Some(self.workspace_origin()?),
            first: Some(built.first.clone()),
            last: Some(built.last.clone()),
            path_filter,
            sequence: Some(built.commits.clone()),
            position: -1,
            warned_head: None,
        };
        self.store.save(&session)?;

        let first = self.backend.commit_summary(&built.first)?;
        let last = self.backend.commit_summary(&built.last)?;
        info!(
            "Sequence prepared: {} commits from {} to {}.",
            built.commits.len(),
            first.short_id,
            last.short_id
        );

        Ok(())
    }

    /// Mark `rev` as the oldest commit to consider.
    ///
    /// Creates a session when none exists, defaulting `last` to the current
    /// revision. Any stored sequence becomes stale.
    pub fn set_first(&self, rev: &str) -> Result<()> {
        let id = self.backend.resolve_revision(rev)?;
        let mut session = self.store.load().unwrap_or_default();
        if session.origin.is_none() {
            session.origin = Some(self.workspace_origin()?);
        }
        session.first = Some(id.clone());
        if session.last.is_none() {
            session.last = Some(self.backend.current_revision()?);
        }
        session.sequence = None;
        session.position = -1;
        self.store.save(&session)?;

        info!("First set to {}.", self.backend.commit_summary(&id)?.short_id);

        Ok(())
    }

    /// Mark `rev` as the newest commit to consider; defaults to the current
    /// revision. Any stored sequence becomes stale.
    pub fn set_last(&self, rev: Option<&str>) -> Result<()> {
        let id = self.backend.resolve_revision(rev.unwrap_or("HEAD"))?;
        let mut session = self.store.load().unwrap_or_default();
        if session.origin.is_none() {
            session.origin = Some(self.workspace_origin()?);
        }
        session.last = Some(id.clone());
        session.sequence = None;
        session.position = -1;
        self.store.save(&session)?;

        info!("Last set to {}.", self.backend.commit_summary(&id)?.short_id);

        Ok(())
    }

    /// Check out the next commit in the sequence.
    ///
    /// The very first call after `start` checks out `first`. At the upper
    /// bound this reports "already at last" and succeeds without moving.
    pub fn next(&self) -> Result<()> {
        let mut session = self.store.load().ok_or(WalkerError::NoActiveSession)?;
        if session.first.is_none() || session.last.is_none() {
            return Err(WalkerError::NoActiveSession);
        }
        self.require_clean()?;
        self.warn_if_last_moved(&mut session)?;
        let seq = self.ensure_sequence(&mut session)?;

        let index = match session.position_index() {
            None => 0,
            Some(index) if index + 1 < seq.len() => index + 1,
            Some(_) => {
                info!("Already at last commit.");
                return Ok(());
            }
        };

        let target = seq[index].clone();
        self.backend.checkout_detached(&target)?;
        session.position = index as i64;
        self.store.save(&session)?;
        self.report_checkout(&target, index, seq.len())?;

        Ok(())
    }

    /// Check out the previous commit in the sequence.
    ///
    /// Unlike `next`, this works without any prior session: the first-parent
    /// lineage of the current revision becomes an implicit session whose
    /// `first` is the root commit and whose `last` is the current revision.
    /// At the lower bound this reports "already at first" and succeeds.
    pub fn prev(&self) -> Result<()> {
        self.require_clean()?;

        let Some(mut session) = self.store.load() else {
            return self.prev_from_lineage();
        };
        self.warn_if_last_moved(&mut session)?;
        let seq = self.ensure_sequence(&mut session)?;

        let current = match session.position_index() {
            Some(index) => index,
            // Nothing checked out yet; derive the position from wherever
            // the workspace happens to be.
            None => {
                let head = self.backend.current_revision()?;
                seq.iter().position(|id| *id == head).unwrap_or(0)
            }
        };

        self.step_back(session, &seq, current)
    }

    /// Finish iteration: restore the workspace and drop all state.
    ///
    /// The checkout target is the explicit `rev` when given, else the
    /// session's recorded origin, else nothing. The session record and lock
    /// marker are cleared even when no checkout happens.
    pub fn reset(&self, rev: Option<&str>) -> Result<()> {
        let session = self.store.load();
        let outcome = self.reset_checkout(rev, session.as_ref());
        self.store.clear();

        match outcome? {
            Some(target) => info!("Reset to {target} and cleared iteration state."),
            None => info!("Nothing to reset; cleared iteration state."),
        }

        Ok(())
    }

    /// Walk the whole sequence, running `command` at every commit.
    ///
    /// Stops at the first commit where `command` exits non-zero, leaving the
    /// workspace there and returning the child's exit code so the caller can
    /// mirror it. Returns zero when the full sequence passes. The position
    /// is persisted before each execution, so an interrupted run resumes
    /// from the last attempted commit.
    #[instrument(skip(self, command), level = "debug")]
    pub fn run(&self, command: &[OsString], reverse: bool) -> Result<i32> {
        let Some(program) = command.first() else {
            return Err(WalkerError::EmptyCommand);
        };
        let mut session = self.store.load().ok_or(WalkerError::NoActiveSession)?;
        if session.first.is_none() {
            return Err(WalkerError::NoActiveSession);
        }
        self.require_clean()?;
        self.warn_if_last_moved(&mut session)?;
        let seq = self.ensure_sequence(&mut session)?;
        let len = seq.len();

        let indices: Vec<usize> = if reverse {
            (0..len).rev().collect()
        } else {
            (0..len).collect()
        };
        for index in indices {
            let target = seq[index].clone();
            self.backend.checkout_detached(&target)?;
            session.position = index as i64;
            self.store.save(&session)?;
            self.report_checkout(&target, index, len)?;

            let status = Command::new(program)
                .args(&command[1..])
                .status()
                .map_err(|source| WalkerError::Exec {
                    command: program.clone(),
                    source,
                })?;
            if !status.success() {
                let code = status.code().unwrap_or(1);
                let summary = self.backend.commit_summary(&target)?;
                error!(
                    "Command exited {code} at {} ({}).",
                    summary.short_id, summary.subject
                );
                return Ok(code);
            }
        }

        info!("Completed run across {len} commits.");

        Ok(0)
    }

    /// Synthesize a session from the first-parent lineage of HEAD, then
    /// step back once.
    fn prev_from_lineage(&self) -> Result<()> {
        let head = self.backend.current_revision()?;
        let lineage = self.backend.lineage(&head)?;
        if lineage.is_empty() {
            info!("Nothing to iterate.");
            return Ok(());
        }

        let current = lineage
            .iter()
            .position(|id| *id == head)
            .unwrap_or(lineage.len() - 1);
        let session = Session {
            origin: Some(self.workspace_origin()?),
            first: lineage.first().cloned(),
            last: Some(head),
            path_filter: Vec::new(),
            sequence: Some(lineage.clone()),
            position: current as i64,
            warned_head: None,
        };

        self.step_back(session, &lineage, current)
    }

    /// Move from `current` to `current - 1`, or report the lower bound.
    fn step_back(&self, mut session: Session, seq: &[CommitId], current: usize) -> Result<()> {
        if current == 0 {
            session.position = 0;
            self.store.save(&session)?;
            info!("Already at first commit.");
            return Ok(());
        }

        let index = current - 1;
        let target = seq[index].clone();
        self.backend.checkout_detached(&target)?;
        session.position = index as i64;
        self.store.save(&session)?;
        self.report_checkout(&target, index, seq.len())?;

        Ok(())
    }

    /// Rebuild and persist the sequence when the stored one is stale.
    fn ensure_sequence(&self, session: &mut Session) -> Result<Vec<CommitId>> {
        if let Some(seq) = &session.sequence {
            return Ok(seq.clone());
        }

        let first = session.first.clone().ok_or(WalkerError::NoActiveSession)?;
        let last = match &session.last {
            Some(last) => last.clone(),
            None => self.backend.current_revision()?,
        };
        let built = sequence::build(
            &self.backend,
            first.as_str(),
            last.as_str(),
            &session.path_filter,
        )?;
        session.first = Some(built.first);
        session.last = Some(built.last);
        session.sequence = Some(built.commits.clone());
        self.store.save(session)?;

        Ok(built.commits)
    }

    /// Warn once per HEAD value when the branch moved under the session.
    ///
    /// Skips warning while HEAD sits inside the stored sequence, since the
    /// walker itself detaches HEAD at every step.
    fn warn_if_last_moved(&self, session: &mut Session) -> Result<()> {
        let Some(last) = session.last.clone() else {
            return Ok(());
        };
        let head = self.backend.current_revision()?;
        if head == last || session.warned_head.as_ref() == Some(&head) {
            return Ok(());
        }
        if let Some(seq) = &session.sequence {
            if seq.contains(&head) {
                return Ok(());
            }
        }

        let stored = self.backend.commit_summary(&last)?;
        let current = self.backend.commit_summary(&head)?;
        warn!(
            "HEAD has moved since the session began; using saved last {} (current HEAD is {}).",
            stored.short_id, current.short_id
        );
        session.warned_head = Some(head);
        self.store.save(session)?;

        Ok(())
    }

    fn reset_checkout(&self, rev: Option<&str>, session: Option<&Session>) -> Result<Option<String>> {
        let target = match rev {
            Some(rev) => Some(self.backend.resolve_revision(rev)?.to_string()),
            None => session.and_then(|session| session.origin.clone()),
        };

        if let Some(target) = &target {
            self.require_clean()?;
            self.backend.checkout(target)?;
        }

        Ok(target)
    }

    fn require_clean(&self) -> Result<()> {
        if !self.backend.working_tree_clean()? {
            return Err(WalkerError::DirtyWorkingTree);
        }

        Ok(())
    }

    /// Branch name the workspace is attached to, else its commit id.
    fn workspace_origin(&self) -> Result<String> {
        match self.backend.current_symbolic_ref()? {
            Some(name) => Ok(name),
            None => Ok(self.backend.current_revision()?.to_string()),
        }
    }

    fn report_checkout(&self, id: &CommitId, index: usize, len: usize) -> Result<()> {
        let summary = self.backend.commit_summary(id)?;
        info!(
            "Checked out {} {} ({}/{len})",
            summary.short_id,
            summary.subject,
            index + 1
        );

        Ok(())
    }
}

/// All possible error types for walker transitions.
#[derive(Debug, thiserror::Error)]
pub enum WalkerError {
    /// Stepping subcommand invoked without a usable session.
    #[error("no active session; run 'git iter start <first> [<last>]' first")]
    NoActiveSession,

    /// Working tree has staged or unstaged modifications.
    #[error("working tree has uncommitted changes; commit or stash them before proceeding")]
    DirtyWorkingTree,

    /// `run` invoked without a command.
    #[error("run requires a command to execute")]
    EmptyCommand,

    /// Child command could not be spawned at all.
    #[error("cannot execute command {command:?}")]
    Exec {
        command: OsString,
        #[source]
        source: std::io::Error,
    },

    /// Backend query or checkout fails.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Sequence construction fails.
    #[error(transparent)]
    Sequence(#[from] sequence::SequenceError),

    /// Session persistence fails.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Friendly result alias :3
pub type Result<T, E = WalkerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn walker(backend: FakeBackend) -> Walker<FakeBackend> {
        Walker::new(backend, SessionStore::new("gitdir"))
    }

    fn id(index: usize) -> CommitId {
        FakeBackend::id_of(index)
    }

    fn start_full_span(walker: &Walker<FakeBackend>, len: usize) {
        walker
            .start(id(0).as_str(), Some(id(len - 1).as_str()), Vec::new())
            .expect("start session");
    }

    #[sealed_test]
    fn start_builds_sequence_without_checkout() {
        let walker = walker(FakeBackend::linear(6));
        start_full_span(&walker, 6);

        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.position, -1);
        assert_eq!(session.origin, Some("main".to_string()));
        assert_eq!(session.sequence.map(|seq| seq.len()), Some(6));
        assert!(walker.backend.checkouts.borrow().is_empty());
    }

    #[sealed_test]
    fn six_nexts_visit_every_commit_then_stabilize() {
        let walker = walker(FakeBackend::linear(6));
        start_full_span(&walker, 6);

        for _ in 0..6 {
            walker.next().expect("step forward");
        }
        let expect: Vec<String> = (0..6).map(|index| id(index).to_string()).collect();
        assert_eq!(*walker.backend.checkouts.borrow(), expect);

        // Further calls stabilize at the boundary and stay successful.
        walker.next().expect("already at last is success");
        walker.next().expect("still success");
        assert_eq!(walker.backend.checkouts.borrow().len(), 6);
        assert_eq!(walker.store.load().expect("session").position, 5);
    }

    #[sealed_test]
    fn next_then_prev_returns_to_same_commit() {
        let walker = walker(FakeBackend::linear(6));
        start_full_span(&walker, 6);
        for _ in 0..3 {
            walker.next().expect("step forward");
        }
        assert_eq!(walker.store.load().expect("session").position, 2);

        walker.next().expect("step forward");
        walker.prev().expect("step backward");

        assert_eq!(walker.store.load().expect("session").position, 2);
        assert_eq!(*walker.backend.head.borrow(), id(2));
    }

    #[sealed_test]
    fn prev_stabilizes_at_first_commit() {
        let walker = walker(FakeBackend::linear(3));
        start_full_span(&walker, 3);
        walker.next().expect("position 0");

        walker.prev().expect("already at first is success");
        walker.prev().expect("still success");

        assert_eq!(walker.store.load().expect("session").position, 0);
        assert_eq!(walker.backend.checkouts.borrow().len(), 1);
    }

    #[sealed_test]
    fn next_without_session_is_an_error() {
        let walker = walker(FakeBackend::linear(3));

        assert!(matches!(walker.next(), Err(WalkerError::NoActiveSession)));
    }

    #[sealed_test]
    fn prev_without_session_walks_the_lineage() {
        let walker = walker(FakeBackend::linear(4));

        walker.prev().expect("synthesize session");

        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.first, Some(id(0)));
        assert_eq!(session.last, Some(id(3)));
        assert_eq!(session.position, 2);
        assert_eq!(*walker.backend.head.borrow(), id(2));
    }

    #[sealed_test]
    fn dirty_working_tree_blocks_stepping_without_mutation() {
        let walker = walker(FakeBackend::linear(4));
        start_full_span(&walker, 4);
        let before = walker.store.load();

        walker.backend.clean.set(false);

        assert!(matches!(walker.next(), Err(WalkerError::DirtyWorkingTree)));
        assert!(matches!(walker.prev(), Err(WalkerError::DirtyWorkingTree)));
        assert!(matches!(
            walker.run(&["true".into()], false),
            Err(WalkerError::DirtyWorkingTree)
        ));
        assert!(walker.backend.checkouts.borrow().is_empty());
        assert_eq!(walker.store.load(), before);
    }

    #[sealed_test]
    fn dirty_working_tree_blocks_start() {
        let walker = walker(FakeBackend::linear(4));
        walker.backend.clean.set(false);

        assert!(matches!(
            walker.start(id(0).as_str(), None, Vec::new()),
            Err(WalkerError::DirtyWorkingTree)
        ));
        assert_eq!(walker.store.load(), None);
    }

    #[sealed_test]
    fn first_and_last_invalidate_stored_sequence() {
        let walker = walker(FakeBackend::linear(5));
        start_full_span(&walker, 5);
        walker.next().expect("position 0");

        walker.set_first(id(1).as_str()).expect("move first");

        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.first, Some(id(1)));
        assert_eq!(session.sequence, None);
        assert_eq!(session.position, -1);

        walker.set_last(Some(id(3).as_str())).expect("move last");
        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.last, Some(id(3)));

        // The next step rebuilds over the narrowed span.
        walker.next().expect("rebuild and step");
        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.sequence.map(|seq| seq.len()), Some(3));
        assert_eq!(*walker.backend.head.borrow(), id(1));
    }

    #[sealed_test]
    fn last_alone_does_not_make_a_steppable_session() {
        let walker = walker(FakeBackend::linear(4));
        walker.set_last(Some(id(2).as_str())).expect("set last");

        assert!(matches!(walker.next(), Err(WalkerError::NoActiveSession)));
    }

    #[sealed_test]
    fn run_stops_at_failing_commit_with_child_exit_code() {
        let backend = FakeBackend::linear(6).with_head_file("HEAD_ID");
        let walker = walker(backend);
        start_full_span(&walker, 6);

        // Fails with 7 exactly when the workspace sits at the third commit.
        let script = format!("test \"$(cat HEAD_ID)\" != \"{}\" || exit 7", id(2));
        let command: Vec<OsString> = vec!["sh".into(), "-c".into(), script.into()];

        let code = walker.run(&command, false).expect("run walks");

        assert_eq!(code, 7);
        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.position, 2);
        assert_eq!(*walker.backend.head.borrow(), id(2));
    }

    #[sealed_test]
    fn run_completes_with_exit_zero() {
        let walker = walker(FakeBackend::linear(4));
        start_full_span(&walker, 4);

        let code = walker
            .run(&["true".into()], false)
            .expect("run walks to completion");

        assert_eq!(code, 0);
        assert_eq!(walker.store.load().expect("session").position, 3);
        assert_eq!(walker.backend.checkouts.borrow().len(), 4);
    }

    #[sealed_test]
    fn run_reverse_visits_newest_first() {
        let walker = walker(FakeBackend::linear(3));
        start_full_span(&walker, 3);

        walker.run(&["true".into()], true).expect("reverse run");

        let expect: Vec<String> = [2, 1, 0].iter().map(|&index| id(index).to_string()).collect();
        assert_eq!(*walker.backend.checkouts.borrow(), expect);
        assert_eq!(walker.store.load().expect("session").position, 0);
    }

    #[sealed_test]
    fn run_without_first_is_an_error() {
        let walker = walker(FakeBackend::linear(3));
        walker.set_last(None).expect("set last");

        assert!(matches!(
            walker.run(&["true".into()], false),
            Err(WalkerError::NoActiveSession)
        ));
    }

    #[sealed_test]
    fn reset_restores_origin_and_clears_state() {
        let walker = walker(FakeBackend::linear(4));
        start_full_span(&walker, 4);
        walker.next().expect("position 0");

        walker.reset(None).expect("reset");

        assert_eq!(walker.store.load(), None);
        assert_eq!(
            walker.backend.checkouts.borrow().last(),
            Some(&"main".to_string())
        );
    }

    #[sealed_test]
    fn reset_clears_state_even_without_target() {
        let walker = walker(FakeBackend::linear(4));
        walker.set_first(id(0).as_str()).expect("create session");
        let mut session = walker.store.load().expect("session persisted");
        session.origin = None;
        walker.store.save(&session).expect("save session");

        walker.reset(None).expect("nothing to reset is success");

        assert_eq!(walker.store.load(), None);
        assert!(walker.backend.checkouts.borrow().is_empty());
    }

    #[sealed_test]
    fn reset_prefers_explicit_revision() {
        let walker = walker(FakeBackend::linear(4));
        start_full_span(&walker, 4);

        walker.reset(Some(id(1).as_str())).expect("reset to rev");

        assert_eq!(walker.store.load(), None);
        assert_eq!(*walker.backend.head.borrow(), id(1));
    }

    #[sealed_test]
    fn moved_head_warns_once_per_head_value() {
        let walker = walker(FakeBackend::linear(6));
        // Session pinned below the branch tip; HEAD then moves elsewhere.
        walker
            .start(id(0).as_str(), Some(id(3).as_str()), Vec::new())
            .expect("start session");
        *walker.backend.head.borrow_mut() = id(5);

        walker.next().expect("step forward");

        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.warned_head, Some(id(5)));
        // The walk keeps using the saved endpoints.
        assert_eq!(session.last, Some(id(3)));
    }

    #[sealed_test]
    fn start_with_path_filter_narrows_sequence() {
        let backend = FakeBackend::linear(6).touch(2, "docs/guide.md");
        let walker = walker(backend);
        walker
            .start(
                id(0).as_str(),
                Some(id(5).as_str()),
                vec!["docs/".to_string()],
            )
            .expect("start session");

        let session = walker.store.load().expect("session persisted");
        assert_eq!(session.sequence, Some(vec![id(0), id(2), id(5)]));
    }
}
