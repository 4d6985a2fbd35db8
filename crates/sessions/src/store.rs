//! File-backed session store.
//!
//! One JSON document per session at `<data_dir>/sessions/<id>.json`. Writes
//! go to a `.tmp` sibling first and are renamed into place, so a crash never
//! leaves a half-written record behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use turnstile_core::error::SessionError;

use crate::session::{Session, SessionSummary};

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open (and create if needed) the store under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        let dir = data_dir.as_ref().join("sessions");
        std::fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Storage(format!("Failed to create {}: {e}", dir.display()))
        })?;
        debug!(path = %dir.display(), "Session store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create and persist a new empty session.
    pub fn create(&self, profile_name: &str) -> Result<Session, SessionError> {
        let session = Session::new(profile_name);
        self.save(&session)?;
        info!(session_id = %session.id, profile = profile_name, "Session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        let path = self
            .path_for(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.to_string()));
            }
            Err(e) => return Err(SessionError::Storage(e.to_string())),
        };

        serde_json::from_str(&content).map_err(|e| SessionError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let path = self
            .path_for(&session.id)
            .ok_or_else(|| SessionError::Storage(format!("Invalid session id: {}", session.id)))?;
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize session: {e}")))?;

        std::fs::write(&tmp, content)
            .map_err(|e| SessionError::Storage(format!("Failed to write session: {e}")))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| SessionError::Storage(format!("Failed to replace session: {e}")))?;
        Ok(())
    }

    /// Delete a session. Returns `false` when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool, SessionError> {
        let Some(path) = self.path_for(id) else {
            return Ok(false);
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(session_id = id, "Session deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::Storage(e.to_string())),
        }
    }

    /// Summaries of stored sessions, most recently updated first.
    pub fn list_summaries(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionError> {
        let mut summaries: Vec<SessionSummary> =
            self.load_all()?.iter().map(Session::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    /// Delete sessions that have no messages and were last touched more
    /// than `max_age` ago. Returns how many were removed.
    pub fn prune_empty(&self, max_age: Duration) -> Result<usize, SessionError> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Ok(0);
        };
        let now = Utc::now();

        let mut pruned = 0;
        for session in self.load_all()? {
            if session.is_empty() && now - session.updated_at >= max_age && self.delete(&session.id)? {
                pruned += 1;
            }
        }

        if pruned > 0 {
            info!(pruned, "Pruned empty sessions");
        }
        Ok(pruned)
    }

    fn load_all(&self) -> Result<Vec<Session>, SessionError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| SessionError::Storage(format!("Failed to read session dir: {e}")))?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.get(id) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }
        Ok(sessions)
    }

    /// Map an id to its file, or `None` when the id is not a safe file stem.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| self.dir.join(format!("{id}.json")))
    }
}
