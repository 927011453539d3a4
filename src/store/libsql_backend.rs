//! libSQL implementation of the async `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::model::IntakeForm;
use crate::intake::session::{IntakeSession, SessionStatus};
use crate::intake::steps::{Step, WizardState};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("timestamp {s:?}: {e}")))
}

/// Convert `Option<DateTime<Utc>>` to a libsql Value.
fn opt_datetime(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to an IntakeSession.
///
/// Column order matches SESSION_COLUMNS:
/// 0:id, 1:status, 2:current_step, 3:form, 4:created_at, 5:updated_at, 6:submitted_at
fn row_to_session(row: &libsql::Row) -> Result<IntakeSession, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("session row parse: {e}"));

    let id_str: String = row.get(0).map_err(read)?;
    let status_str: String = row.get(1).map_err(read)?;
    let step_str: String = row.get(2).map_err(read)?;
    let form_str: String = row.get(3).map_err(read)?;
    let created_str: String = row.get(4).map_err(read)?;
    let updated_str: String = row.get(5).map_err(read)?;
    let submitted_str: Option<String> = row.get(6).ok();

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("session id {id_str:?}: {e}")))?;
    let status: SessionStatus = status_str.parse().map_err(DatabaseError::Serialization)?;
    let form: IntakeForm = serde_json::from_str(&form_str)
        .map_err(|e| DatabaseError::Serialization(format!("session {id} form: {e}")))?;

    Ok(IntakeSession {
        id,
        form,
        wizard: WizardState {
            current: Step::new(step_str),
        },
        status,
        created_at: parse_datetime(&created_str)?,
        updated_at: parse_datetime(&updated_str)?,
        submitted_at: submitted_str.as_deref().map(parse_datetime).transpose()?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const SESSION_COLUMNS: &str =
    "id, status, current_step, form, created_at, updated_at, submitted_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn save_session(&self, session: &IntakeSession) -> Result<(), DatabaseError> {
        let form_json = serde_json::to_string(&session.form)
            .map_err(|e| DatabaseError::Serialization(format!("session {} form: {e}", session.id)))?;

        self.conn()
            .execute(
                "INSERT INTO intake_sessions (id, status, current_step, form, created_at, updated_at, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    current_step = excluded.current_step,
                    form = excluded.form,
                    updated_at = excluded.updated_at,
                    submitted_at = excluded.submitted_at",
                params![
                    session.id.to_string(),
                    session.status.as_str(),
                    session.wizard.current.as_str(),
                    form_json,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                    opt_datetime(session.submitted_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;

        debug!(session_id = %session.id, status = %session.status, "Session saved");
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<IntakeSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM intake_sessions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn list_submitted(&self, limit: usize) -> Result<Vec<IntakeSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM intake_sessions WHERE status = 'submitted' ORDER BY submitted_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_submitted: {e}")))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_submitted: {e}")))?
        {
            sessions.push(row_to_session(&row)?);
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::steps::{Direction, StepRegistry};

    fn session_with_member(registry: &StepRegistry) -> IntakeSession {
        let mut session = IntakeSession::new(registry);
        session.add_member("m1", "Alice").unwrap();
        session
            .apply_field("m1.demographics.SSN", Some(&"0042".into()))
            .unwrap();
        session
    }

    #[tokio::test]
    async fn save_and_load_session() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let registry = StepRegistry::default();
        let session = session_with_member(&registry);

        db.save_session(&session).await.unwrap();
        let loaded = db.get_session(session.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.form, session.form);
        assert_eq!(loaded.wizard, session.wizard);
        assert_eq!(loaded.status, SessionStatus::InProgress);
        assert_eq!(loaded.created_at, session.created_at);
        assert!(loaded.submitted_at.is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_row() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let registry = StepRegistry::default();
        let mut session = session_with_member(&registry);
        db.save_session(&session).await.unwrap();

        session.navigate(&registry, Direction::Next).unwrap();
        session
            .apply_field("m1.demographics.gender", Some(&"Female".into()))
            .unwrap();
        db.save_session(&session).await.unwrap();

        let loaded = db.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.wizard.current, session.wizard.current);
        assert_eq!(loaded.form, session.form);
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.get_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_submitted_skips_in_progress() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let registry = StepRegistry::new(["review"]).unwrap();

        let draft = session_with_member(&registry);
        db.save_session(&draft).await.unwrap();

        let mut done = session_with_member(&registry);
        done.submit(&registry).unwrap();
        db.save_session(&done).await.unwrap();

        let submitted = db.list_submitted(10).await.unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].id, done.id);
        assert_eq!(submitted[0].status, SessionStatus::Submitted);
        assert!(submitted[0].submitted_at.is_some());
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_an_error() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let id = Uuid::new_v4();
        db.conn()
            .execute(
                "INSERT INTO intake_sessions (id, status, current_step, form, created_at, updated_at)
                 VALUES (?1, 'in_progress', 'household', '{}', 'not a date', ?2)",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )
            .await
            .unwrap();

        let err = db.get_session(id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)), "{err}");
    }

    #[test]
    fn parse_datetime_accepts_sqlite_format() {
        let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
        assert!(parse_datetime("").is_err());
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("intake.db");
        let registry = StepRegistry::default();
        let session = session_with_member(&registry);

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.save_session(&session).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = db.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.form, session.form);
    }
}
