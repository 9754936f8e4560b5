// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Linear commit walking over a Git repository.
//!
//! git-iter is like `git bisect`, but iterates linearly instead of
//! bisecting. A persisted __session__ records the endpoints of the walk,
//! the computed first-parent commit sequence between them, and the current
//! position; subcommands step the workspace through that sequence one
//! detached checkout at a time, or drive the whole sequence under an
//! external command until it first fails.
//!
//! This is especially useful when the commit history is dirty (a mix of bad
//! and good commits) and the earliest bad commit is wanted: bisection
//! assumes monotonic history and may land anywhere, while a linear walk
//! always finds the first failure.
//!
//! # Architecture
//!
//! - [`backend`]: everything Git, behind the [`Backend`] trait.
//! - [`session`]: the persisted session record.
//! - [`store`]: session persistence and the advisory lock marker.
//! - [`sequence`]: sequence construction between two endpoints.
//! - [`walker`]: the subcommand transition functions.

pub mod backend;
pub mod sequence;
pub mod session;
pub mod store;
pub mod walker;

pub use backend::{Backend, CommitId, Git2Backend};
pub use session::Session;
pub use store::SessionStore;
pub use walker::Walker;
