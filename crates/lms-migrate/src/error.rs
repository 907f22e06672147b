//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Required environment variables are not set.
    #[error("Missing required configuration: {}\n{diagnostic}", missing.join(", "))]
    ConfigurationMissing {
        missing: Vec<String>,
        diagnostic: String,
    },

    /// Configuration error (invalid YAML, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest file or source table could not be read
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single record could not be migrated
    #[error("Transfer failed for {record}: {message}")]
    TransferFailed { record: String, message: String },

    /// Destination database lacks expected tables
    #[error("Destination schema is missing tables: {}", tables.join(", "))]
    SchemaMissing { tables: Vec<String> },

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a TransferFailed error
    pub fn transfer(record: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::TransferFailed {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Create a SourceUnavailable error
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        MigrateError::SourceUnavailable(message.into())
    }

    /// Process exit code for this error. Every fatal error maps to 1.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_missing_lists_variables() {
        let err = MigrateError::ConfigurationMissing {
            missing: vec!["TARGET_DATABASE_URL".into()],
            diagnostic: "  SOURCE_DATABASE_URL: set\n  TARGET_DATABASE_URL: unset".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("TARGET_DATABASE_URL"));
        assert!(msg.contains("SOURCE_DATABASE_URL: set"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "manifest.json");
        let err = MigrateError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error"));
    }

    #[test]
    fn test_schema_missing_message() {
        let err = MigrateError::SchemaMissing {
            tables: vec!["Course".into(), "Chapter".into()],
        };
        assert_eq!(
            err.to_string(),
            "Destination schema is missing tables: Course, Chapter"
        );
    }
}
