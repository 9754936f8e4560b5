// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Walking session layout.
//!
//! A __session__ is the one piece of mutable state git-iter owns: the
//! endpoints of the walk, the optional path filter, the computed commit
//! sequence, and the current position inside it. It is persisted as a
//! human-diffable TOML record under the repository's git directory, loaded
//! at the start of each invocation, and saved back whenever a subcommand
//! mutates it. File I/O is left to [`SessionStore`](crate::store::SessionStore).

use crate::backend::CommitId;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Persisted state of a walking session.
///
/// `first` and `last` are optional in the record because `git iter last`
/// may create a session before `first` is known. Every operation that needs
/// a bound validates presence itself.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Session {
    /// Reference the workspace pointed to before the session began. A short
    /// branch name when HEAD was attached, else an absolute commit id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Oldest commit of the walk, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<CommitId>,

    /// Newest commit of the walk, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<CommitId>,

    /// Pathspec patterns restricting the walk; empty means unrestricted.
    pub path_filter: Vec<String>,

    /// Ordered commit ids from `first` to `last`. Absent when stale or not
    /// yet built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<CommitId>>,

    /// Index into `sequence`; `-1` means no commit checked out yet.
    pub position: i64,

    /// HEAD value we already warned about after it moved under the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warned_head: Option<CommitId>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            origin: None,
            first: None,
            last: None,
            path_filter: Vec::new(),
            sequence: None,
            position: -1,
            warned_head: None,
        }
    }
}

impl Session {
    /// Classify the session for the walker state machine.
    pub fn walk_state(&self) -> WalkState {
        match (&self.sequence, self.position) {
            (None, _) => WalkState::NoSequence,
            (Some(_), position) if position < 0 => WalkState::Ready,
            (Some(_), position) => WalkState::Positioned(position as usize),
        }
    }

    /// Current position as a sequence index, if any commit is checked out.
    pub fn position_index(&self) -> Option<usize> {
        (self.position >= 0).then_some(self.position as usize)
    }

    /// Check the structural invariants of a loaded record.
    ///
    /// The position must stay inside `[-1, len - 1]`, and a stored sequence
    /// must begin at `first` and end at `last`. Records violating either are
    /// treated as absent by the store, never as corruption errors.
    pub fn is_well_formed(&self) -> bool {
        let Some(sequence) = &self.sequence else {
            return self.position == -1;
        };

        if sequence.is_empty() || self.position < -1 {
            return false;
        }

        if self.position >= sequence.len() as i64 {
            return false;
        }

        let endpoints_match = match (&self.first, &self.last) {
            (Some(first), Some(last)) => {
                sequence.first() == Some(first) && sequence.last() == Some(last)
            }
            _ => false,
        };

        endpoints_match
    }
}

/// Walker state machine classification of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// Endpoints may be set, but the sequence is stale or missing.
    NoSequence,

    /// Sequence built, nothing checked out yet.
    Ready,

    /// Sequence built, commit at the given index checked out.
    Positioned(usize),
}

impl FromStr for Session {
    type Err = SessionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Ok(toml::de::from_str(data).map_err(SessionError::Deserialize)?)
    }
}

impl Display for Session {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(SessionError::Serialize)?
                .as_str(),
        )
    }
}

/// Session record error types.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Failed to deserialize session record.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize session record.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

impl From<SessionError> for FmtError {
    fn from(_: SessionError) -> Self {
        FmtError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn session_with_sequence(position: i64) -> Session {
        let sequence: Vec<CommitId> = ["a", "b", "c"]
            .iter()
            .map(|letter| CommitId::from(letter.repeat(40)))
            .collect();

        Session {
            origin: Some("main".to_string()),
            first: sequence.first().cloned(),
            last: sequence.last().cloned(),
            path_filter: Vec::new(),
            sequence: Some(sequence),
            position,
            warned_head: None,
        }
    }

    #[test]
    fn deserialize_session_record() -> anyhow::Result<()> {
        let result: Session = indoc! {r#"
            origin = "main"
            first = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            last = "cccccccccccccccccccccccccccccccccccccccc"
            path_filter = ["docs/"]
            sequence = [
                "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                "cccccccccccccccccccccccccccccccccccccccc",
            ]
            position = -1
        "#}
        .parse()?;

        let mut expect = session_with_sequence(-1);
        expect.path_filter = vec!["docs/".to_string()];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_skips_unset_fields() {
        let result = Session {
            last: Some(CommitId::from("c".repeat(40))),
            ..Default::default()
        }
        .to_string();

        let expect = indoc! {r#"
            last = "cccccccccccccccccccccccccccccccccccccccc"
            path_filter = []
            position = -1
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let result: Result<Session, SessionError> = indoc! {r#"
            position = -1
            path_filter = []
            leftover = "from an older version"
        "#}
        .parse();

        assert!(result.is_ok());
    }

    #[test_case(-1, WalkState::Ready; "sequence built but nothing checked out")]
    #[test_case(0, WalkState::Positioned(0); "positioned at first")]
    #[test_case(2, WalkState::Positioned(2); "positioned at last")]
    #[test]
    fn walk_state_classification(position: i64, expect: WalkState) {
        pretty_assertions::assert_eq!(session_with_sequence(position).walk_state(), expect);
    }

    #[test]
    fn walk_state_without_sequence() {
        assert_eq!(Session::default().walk_state(), WalkState::NoSequence);
    }

    #[test_case(-1, true; "unpositioned is fine")]
    #[test_case(2, true; "last index is fine")]
    #[test_case(3, false; "past the end is malformed")]
    #[test_case(-2, false; "below sentinel is malformed")]
    #[test]
    fn well_formed_checks_position_bounds(position: i64, expect: bool) {
        pretty_assertions::assert_eq!(session_with_sequence(position).is_well_formed(), expect);
    }

    #[test]
    fn well_formed_requires_matching_endpoints() {
        let mut session = session_with_sequence(0);
        session.first = Some(CommitId::from("d".repeat(40)));
        assert!(!session.is_well_formed());
    }
}
