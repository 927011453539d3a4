//! Backend-agnostic `Database` trait for intake persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::session::IntakeSession;

/// Single async interface for all persistence.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert or replace a session.
    async fn save_session(&self, session: &IntakeSession) -> Result<(), DatabaseError>;

    /// Get a session by ID.
    async fn get_session(&self, id: Uuid) -> Result<Option<IntakeSession>, DatabaseError>;

    /// Submitted sessions, most recently submitted first, up to `limit`.
    async fn list_submitted(&self, limit: usize) -> Result<Vec<IntakeSession>, DatabaseError>;
}
