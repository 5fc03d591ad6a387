//! Session storage.
//!
//! All sessions live in memory behind one lock; every mutation goes through
//! [`SessionStore::update`], which applies the change to a copy, persists it
//! and only then publishes it. A failed closure or write leaves the stored
//! session untouched.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::SessionError;
use super::model::{Session, StepStatus};

/// Note recorded on attempts that were running when the process stopped.
pub const INTERRUPTED_NOTE: &str = "Execution was interrupted by a restart. Submit the step again.";

/// Durable backing for the session store.
pub trait SessionPersistence: Send + Sync {
    fn load_all(&self) -> Result<Vec<Session>, SessionError>;
    fn save(&self, session: &Session) -> Result<(), SessionError>;
}

/// Keeps nothing; sessions vanish with the process.
pub struct MemoryPersistence;

impl SessionPersistence for MemoryPersistence {
    fn load_all(&self) -> Result<Vec<Session>, SessionError> {
        Ok(Vec::new())
    }

    fn save(&self, _session: &Session) -> Result<(), SessionError> {
        Ok(())
    }
}

/// One pretty-printed JSON file per session: `<dir>/<id>.json`.
pub struct JsonDirPersistence {
    dir: PathBuf,
}

impl JsonDirPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Storage(format!("failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SessionPersistence for JsonDirPersistence {
    fn load_all(&self) -> Result<Vec<Session>, SessionError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            SessionError::Storage(format!("failed to read {}: {e}", self.dir.display()))
        })?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|contents| {
                    serde_json::from_str::<Session>(&contents).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
            }
        }
        Ok(sessions)
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let contents = serde_json::to_string_pretty(session)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let path = self.path_for(session.id);
        // write-then-rename so a crash never leaves a truncated file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| SessionError::Storage(format!("failed to write {}: {e}", path.display())))
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    persistence: Arc<dyn SessionPersistence>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            persistence: Arc::new(MemoryPersistence),
        }
    }

    /// Loads every persisted session. Attempts left `in_progress` by a
    /// previous process are marked failed, since no worker owns them anymore.
    pub fn open(persistence: Arc<dyn SessionPersistence>) -> Result<Self, SessionError> {
        let mut sessions = HashMap::new();
        for mut session in persistence.load_all()? {
            if recover_interrupted(&mut session) {
                persistence.save(&session)?;
            }
            sessions.insert(session.id, session);
        }
        debug!(count = sessions.len(), "Loaded sessions");

        Ok(Self {
            sessions: Arc::new(RwLock::new(sessions)),
            persistence,
        })
    }

    pub async fn insert(&self, session: Session) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        self.persistence.save(&session)?;
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// All sessions, newest first.
    pub async fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Applies `change` atomically with respect to every other store operation.
    pub async fn update<T>(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions.write().await;
        let current = sessions.get(&id).ok_or(SessionError::NotFound(id))?;

        let mut next = current.clone();
        let value = change(&mut next)?;
        next.touch();
        self.persistence.save(&next)?;
        sessions.insert(id, next);
        Ok(value)
    }
}

fn recover_interrupted(session: &mut Session) -> bool {
    let mut changed = false;
    for result in &mut session.results {
        if result.status == StepStatus::InProgress {
            result.status = StepStatus::Failed;
            result.validation_notes = INTERRUPTED_NOTE.to_string();
            result.completed_at = Some(Utc::now());
            changed = true;
        }
    }
    changed
}
