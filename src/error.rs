//! Error types for the gatewatch workers.

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewatchError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Probe error: {0}")]
    ProbeError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for GatewatchError {
    fn from(err: sqlx::Error) -> Self {
        GatewatchError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for GatewatchError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        GatewatchError::DatabaseError(format!("Migration failed: {err}"))
    }
}

impl From<ConfigurationError> for GatewatchError {
    fn from(err: ConfigurationError) -> Self {
        GatewatchError::ConfigurationError(err.to_string())
    }
}

pub type GatewatchResult<T> = std::result::Result<T, GatewatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_category() {
        let err = GatewatchError::ProbeError("no TLS provider".to_string());
        assert_eq!(err.to_string(), "Probe error: no TLS provider");
    }

    #[test]
    fn test_configuration_error_conversion() {
        let err: GatewatchError =
            ConfigurationError::missing_required_field("url", "database").into();
        assert!(matches!(err, GatewatchError::ConfigurationError(_)));
        assert!(err.to_string().contains("'url' in database"));
    }
}
