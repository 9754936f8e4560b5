// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Session persistence and locking.
//!
//! Sessions live in a dedicated `iter` directory inside the repository's git
//! directory: one TOML record and one lock marker. Saves replace the record
//! atomically. Loads never hard-error; a missing or structurally invalid
//! record simply means "no session".
//!
//! The lock marker guards concurrent invocations. It is best-effort and
//! advisory only: acquisition fails fast instead of blocking, and a crashed
//! process leaves a stale marker behind that `git iter reset` clears.

use crate::session::Session;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const SESSION_FILENAME: &str = "session.toml";
const LOCK_FILENAME: &str = "lock";

/// File-backed store for the walking session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Construct a store rooted under the given git directory.
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: git_dir.as_ref().join("iter"),
        }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILENAME)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILENAME)
    }

    /// Load the persisted session, if a well-formed one exists.
    pub fn load(&self) -> Option<Session> {
        let data = fs::read_to_string(self.session_path()).ok()?;
        let session = match data.parse::<Session>() {
            Ok(session) => session,
            Err(error) => {
                warn!("ignoring unreadable session record: {error}");
                return None;
            }
        };

        if !session.is_well_formed() {
            warn!("ignoring structurally invalid session record");
            return None;
        }

        Some(session)
    }

    /// Atomically overwrite the persisted session record.
    pub fn save(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let data = toml::ser::to_string_pretty(session)?;
        let tmp = self.dir.join(format!("{SESSION_FILENAME}.tmp"));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, self.session_path())?;
        debug!("saved session record to {:?}", self.session_path());

        Ok(())
    }

    /// Remove the persisted record and any lock marker, best effort.
    pub fn clear(&self) {
        let _ = fs::remove_file(self.session_path());
        let _ = fs::remove_file(self.lock_path());
        let _ = fs::remove_dir(&self.dir);
    }

    /// Acquire the lock marker, holding it until the guard drops.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::SessionLocked`] if a marker already exists.
    ///   No blocking wait is attempted.
    pub fn lock(&self) -> Result<LockMarker> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path();
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::SessionLocked { path });
            }
            Err(error) => return Err(error.into()),
        };
        write!(file, "{}", std::process::id())?;

        Ok(LockMarker { path })
    }
}

/// Held lock marker; removes itself on every exit path via [`Drop`].
#[derive(Debug)]
pub struct LockMarker {
    path: PathBuf,
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        // Removal may race with an explicit clear(); missing is fine.
        let _ = fs::remove_file(&self.path);
    }
}

/// All possible error types for session store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another invocation already holds the lock marker.
    #[error("git-iter is already in use (lock found at {path:?}); \
             remove the marker if no other invocation is running")]
    SessionLocked { path: PathBuf },

    /// Session record serialization fails.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Session file manipulation fails.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
