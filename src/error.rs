use thiserror::Error;

/// Main error type for Glossgraph
#[derive(Error, Debug)]
pub enum GlossError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested gloss or situation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Natural-key collision, or deletion of a referenced node
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A relation points at an ID absent from the store
    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    /// Network-level failure while talking to a remote record endpoint
    #[error("Fetch failure: {0}")]
    FetchFailure(String),

    /// JSON (de)serialization of stored columns or payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GlossError {
    /// Map SQLite constraint failures onto the domain taxonomy.
    ///
    /// UNIQUE violations on `(language, content)` or a situation identifier
    /// become `Conflict`; foreign-key violations become `Conflict` too since
    /// the only way to trip one after validation is deleting a referenced row.
    pub fn from_constraint(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                GlossError::Conflict(what.into())
            }
            _ => GlossError::Database(err),
        }
    }
}

/// Convenient Result type using GlossError
pub type Result<T> = std::result::Result<T, GlossError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GlossError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: GlossError = rusqlite_err.into();
        assert!(matches!(err, GlossError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GlossError = io_err.into();
        assert!(matches!(err, GlossError::Io(_)));
    }

    #[test]
    fn test_constraint_maps_to_conflict() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed: glosses.language, glosses.content".to_string()),
        );
        let err = GlossError::from_constraint(sqlite_err, "spa/hola already exists");
        assert!(matches!(err, GlossError::Conflict(msg) if msg.contains("hola")));

        let other = GlossError::from_constraint(rusqlite::Error::InvalidQuery, "x");
        assert!(matches!(other, GlossError::Database(_)));
    }
}
