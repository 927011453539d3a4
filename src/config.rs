//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::intake::steps::StepRegistry;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default on-disk database location.
pub const DEFAULT_DB_PATH: &str = "./data/intake.db";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the REST/WebSocket server binds on.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Wizard step order.
    pub steps: StepRegistry,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            steps: StepRegistry::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `INTAKE_*` environment variables.
    ///
    /// Unset variables fall back to defaults; set but unparseable ones are
    /// an error rather than being silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("INTAKE_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "INTAKE_PORT".to_string(),
                    message: format!("{raw:?}: {e}"),
                })?,
            None => DEFAULT_PORT,
        };

        let db_path = lookup("INTAKE_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let steps = match lookup("INTAKE_STEPS") {
            Some(raw) => {
                let ids: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                StepRegistry::new(ids).map_err(|e| ConfigError::InvalidValue {
                    key: "INTAKE_STEPS".to_string(),
                    message: e.to_string(),
                })?
            }
            None => StepRegistry::default(),
        };

        Ok(Self {
            port,
            db_path,
            steps,
        })
    }
}
