//! Error types for the intake service.

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

impl From<NavigationError> for Error {
    fn from(e: NavigationError) -> Self {
        Self::Intake(IntakeError::Navigation(e))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while editing or navigating an intake form.
///
/// Every variant is local to the operation that raised it: a rejected field
/// update leaves the rest of the form exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Family member {member} not found")]
    MemberNotFound { member: String },

    #[error("Malformed field path {path:?}: {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Family member {member} has no first name")]
    MissingFirstName { member: String },

    #[error("Family member {member} already exists")]
    DuplicateMember { member: String },

    #[error("Intake session {id} not found")]
    SessionNotFound { id: Uuid },

    #[error("Intake session {id} was already submitted")]
    AlreadySubmitted { id: Uuid },

    #[error("Intake is incomplete: {reason}")]
    Incomplete { reason: String },

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Step registry and wizard navigation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("Step {step} is not in the step registry")]
    StepNotFound { step: String },

    #[error("Step registry is empty")]
    EmptyRegistry,

    #[error("Step {step} appears more than once in the step registry")]
    DuplicateStep { step: String },

    #[error("Already at the first step ({step})")]
    AtFirstStep { step: String },

    #[error("Already at the last step ({step})")]
    AtLastStep { step: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
