//! Owns live intake sessions, persists them, and broadcasts changes to
//! subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, IntakeError, Result};
use crate::store::Database;

use super::binder::FieldValue;
use super::model::FamilyMember;
use super::render::{RenderedStep, RendererSet};
use super::session::{IntakeSession, SessionStatus};
use super::steps::{Direction, Step, StepRegistry};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Default cap on sessions held in memory at once.
pub const DEFAULT_MAX_LIVE_SESSIONS: usize = 1024;

/// Default idle time after which a session is released from memory.
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 30;

/// Change notifications pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntakeEvent {
    SessionStarted {
        session_id: Uuid,
    },
    MemberAdded {
        session_id: Uuid,
        member_key: String,
    },
    MemberRemoved {
        session_id: Uuid,
        member_key: String,
    },
    FieldUpdated {
        session_id: Uuid,
        member_key: String,
        path: String,
    },
    StepChanged {
        session_id: Uuid,
        step: Step,
        progress_percent: f64,
    },
    Submitted {
        session_id: Uuid,
    },
    /// Full snapshot, sent on connect and after a client lags.
    SessionSync {
        session: IntakeSession,
    },
}

impl IntakeEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::SessionStarted { session_id }
            | Self::MemberAdded { session_id, .. }
            | Self::MemberRemoved { session_id, .. }
            | Self::FieldUpdated { session_id, .. }
            | Self::StepChanged { session_id, .. }
            | Self::Submitted { session_id } => *session_id,
            Self::SessionSync { session } => session.id,
        }
    }
}

/// Position reported after a navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepProgress {
    pub step: Step,
    pub step_index: usize,
    pub step_count: usize,
    pub progress_percent: f64,
}

/// Bounds on the in-memory session map.
///
/// With a store configured, released sessions are reloaded on next access.
/// Without one, releasing a session discards it.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_live: usize,
    pub idle_timeout: chrono::Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_live: DEFAULT_MAX_LIVE_SESSIONS,
            idle_timeout: chrono::Duration::minutes(DEFAULT_SESSION_IDLE_MINUTES),
        }
    }
}

type SessionHandle = Arc<Mutex<IntakeSession>>;

/// Coordinates intake sessions: lookup, mutation, persistence, events.
///
/// Each session has its own lock. A mutation, its save and its event all
/// happen under that lock, so subscribers see one session's events in the
/// order they were applied.
pub struct IntakeManager {
    db: Option<Arc<dyn Database>>,
    registry: StepRegistry,
    renderers: RendererSet,
    limits: SessionLimits,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    tx: broadcast::Sender<IntakeEvent>,
}

impl IntakeManager {
    pub fn new(
        registry: StepRegistry,
        renderers: RendererSet,
        db: Option<Arc<dyn Database>>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            db,
            registry,
            renderers,
            limits: SessionLimits::default(),
            sessions: RwLock::new(HashMap::new()),
            tx,
        }
    }

    /// In-memory manager with the standard renderers and no store.
    pub fn in_memory(registry: StepRegistry) -> Self {
        Self::new(registry, RendererSet::standard(), None)
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.registry
    }

    /// Subscribe to change events for all sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.tx.subscribe()
    }

    /// Number of sessions currently held in memory.
    pub async fn live_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn publish(&self, event: IntakeEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    async fn persist(&self, session: &IntakeSession) -> std::result::Result<(), DatabaseError> {
        match &self.db {
            Some(db) => db.save_session(session).await,
            None => Ok(()),
        }
    }

    /// Persist, logging instead of failing. Edits stay live in memory.
    async fn persist_best_effort(&self, session: &IntakeSession) {
        if let Err(e) = self.persist(session).await {
            warn!(session_id = %session.id, error = %e, "Failed to persist intake session");
        }
    }

    async fn load(&self, id: Uuid) -> Result<IntakeSession> {
        let Some(db) = &self.db else {
            return Err(IntakeError::SessionNotFound { id }.into());
        };
        match db.get_session(id).await? {
            Some(session) => {
                debug!(session_id = %id, "Session loaded from store");
                Ok(session)
            }
            None => Err(IntakeError::SessionNotFound { id }.into()),
        }
    }

    /// The live handle for `id`, loading it from the store on a miss.
    async fn handle(&self, id: Uuid) -> Result<SessionHandle> {
        if let Some(handle) = self.sessions.read().await.get(&id) {
            return Ok(Arc::clone(handle));
        }
        let loaded = self.load(id).await?;
        let mut sessions = self.sessions.write().await;
        // Another request may have loaded it meanwhile; keep theirs.
        let handle = sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(Arc::clone(handle))
    }

    /// Run `f` against one session under its lock, then persist the result
    /// and publish the event `f` returned before releasing the lock.
    async fn mutate<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(
            &mut IntakeSession,
            &StepRegistry,
        ) -> std::result::Result<(T, IntakeEvent), IntakeError>,
    ) -> Result<(T, IntakeSession)> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;

        let (out, event) = f(&mut *session, &self.registry)?;
        let snapshot = session.clone();
        self.persist_best_effort(&snapshot).await;
        self.publish(event);
        Ok((out, snapshot))
    }

    /// Create a new session at the first step.
    pub async fn start_session(&self) -> Result<IntakeSession> {
        let session = IntakeSession::new(&self.registry);
        self.persist_best_effort(&session).await;
        let over_cap = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.id, Arc::new(Mutex::new(session.clone())));
            sessions.len() > self.limits.max_live
        };
        info!(session_id = %session.id, step = %session.current_step(), "Intake session started");
        self.publish(IntakeEvent::SessionStarted {
            session_id: session.id,
        });
        if over_cap {
            self.expire_idle().await;
        }
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<IntakeSession> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Render the session's current step.
    pub async fn render(&self, id: Uuid) -> Result<RenderedStep> {
        let session = self.get_session(id).await?;
        Ok(session.render(&self.renderers, &self.registry)?)
    }

    pub async fn add_member(
        &self,
        id: Uuid,
        key: &str,
        first_name: &str,
    ) -> Result<FamilyMember> {
        let (_, session) = self
            .mutate(id, |s, _| {
                s.add_member(key, first_name)?;
                let event = IntakeEvent::MemberAdded {
                    session_id: id,
                    member_key: key.to_string(),
                };
                Ok(((), event))
            })
            .await?;
        info!(session_id = %id, member = key, "Family member added");
        Ok(session.form.member(key)?.clone())
    }

    pub async fn remove_member(&self, id: Uuid, key: &str) -> Result<FamilyMember> {
        let (removed, _) = self
            .mutate(id, |s, _| {
                let removed = s.remove_member(key)?;
                let event = IntakeEvent::MemberRemoved {
                    session_id: id,
                    member_key: key.to_string(),
                };
                Ok((removed, event))
            })
            .await?;
        info!(session_id = %id, member = key, "Family member removed");
        Ok(removed)
    }

    /// Apply one field edit and return the updated member.
    pub async fn update_field(
        &self,
        id: Uuid,
        path: &str,
        value: Option<&FieldValue>,
    ) -> Result<FamilyMember> {
        let (parsed, session) = self
            .mutate(id, |s, _| {
                let parsed = s.apply_field(path, value)?;
                let event = IntakeEvent::FieldUpdated {
                    session_id: id,
                    member_key: parsed.member.clone(),
                    path: parsed.to_string(),
                };
                Ok((parsed, event))
            })
            .await?;
        Ok(session.form.member(&parsed.member)?.clone())
    }

    /// Move the wizard one step in `direction`.
    pub async fn navigate(&self, id: Uuid, direction: Direction) -> Result<StepProgress> {
        let (progress, _) = self
            .mutate(id, |s, registry| {
                let step = s.navigate(registry, direction)?;
                let progress = StepProgress {
                    step_index: registry.index_of(&step)?,
                    step_count: registry.len(),
                    progress_percent: registry.progress_percent(&step)?,
                    step,
                };
                let event = IntakeEvent::StepChanged {
                    session_id: id,
                    step: progress.step.clone(),
                    progress_percent: progress.progress_percent,
                };
                Ok((progress, event))
            })
            .await?;
        debug!(
            session_id = %id,
            step = %progress.step,
            progress = progress.progress_percent,
            "Wizard step changed"
        );
        Ok(progress)
    }

    /// Submit the completed form. Unlike edits, a failed save is an error
    /// and leaves the session in progress.
    pub async fn submit(&self, id: Uuid) -> Result<IntakeSession> {
        let handle = self.handle(id).await?;
        let submitted = {
            let mut session = handle.lock().await;
            let mut submitted = session.clone();
            submitted.submit(&self.registry)?;
            self.persist(&submitted).await?;
            *session = submitted.clone();
            self.publish(IntakeEvent::Submitted { session_id: id });
            submitted
        };
        drop(handle);

        info!(
            session_id = %id,
            members = submitted.form.len(),
            "Intake submitted"
        );

        // Stored and read-only from here on.
        if self.db.is_some() {
            self.release(id).await;
        }
        Ok(submitted)
    }

    /// Submitted sessions, newest first.
    pub async fn list_submitted(&self, limit: usize) -> Result<Vec<IntakeSession>> {
        if let Some(db) = &self.db {
            return Ok(db.list_submitted(limit).await?);
        }
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut submitted = Vec::new();
        for handle in handles {
            let session = handle.lock().await;
            if session.status == SessionStatus::Submitted {
                submitted.push(session.clone());
            }
        }
        submitted.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        submitted.truncate(limit);
        Ok(submitted)
    }

    /// Drop one session from memory unless a request is still using it.
    async fn release(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(&id).is_some_and(|h| Arc::strong_count(h) == 1) {
            sessions.remove(&id);
            debug!(session_id = %id, "Session released from memory");
        }
    }

    /// Release idle sessions (and, with a store, submitted ones), then trim
    /// the least recently updated down to the cap. Sessions in use by a
    /// request are skipped. Returns the number released.
    pub async fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let has_store = self.db.is_some();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        // Handles are only cloned out of the map, and we hold its write
        // lock, so a count of one means no request holds the session.
        sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            let Ok(session) = handle.try_lock() else {
                return true;
            };
            let idle = now - session.updated_at >= self.limits.idle_timeout;
            let done = has_store && session.is_submitted();
            !(idle || done)
        });

        if sessions.len() > self.limits.max_live {
            let mut candidates: Vec<(DateTime<Utc>, Uuid)> = sessions
                .iter()
                .filter(|(_, handle)| Arc::strong_count(handle) == 1)
                .filter_map(|(id, handle)| handle.try_lock().ok().map(|s| (s.updated_at, *id)))
                .collect();
            candidates.sort();
            let excess = sessions.len() - self.limits.max_live;
            for (_, id) in candidates.into_iter().take(excess) {
                sessions.remove(&id);
            }
        }

        let released = before - sessions.len();
        if released > 0 {
            if has_store {
                info!(count = released, live = sessions.len(), "Released intake sessions");
            } else {
                warn!(
                    count = released,
                    live = sessions.len(),
                    "Discarded intake sessions (no store configured)"
                );
            }
        }
        released
    }
}

/// Spawn a background task that releases idle sessions every 60 seconds.
pub fn spawn_expiry_task(manager: Arc<IntakeManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            manager.expire_idle().await;
        }
    })
}
