use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    /// Foreign-key or uniqueness violation.
    #[error("integrity error: {message}")]
    Integrity { message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The rule set did not cut a reference cycle before the depth ceiling.
    #[error("serialization exceeded maximum depth at '{path}'")]
    SerializationDepth { path: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        StoreError::Integrity {
            message: message.into(),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::Integrity { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref detail)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Integrity {
                    message: detail.clone().unwrap_or_else(|| failure.to_string()),
                }
            }
            other => StoreError::Sqlite(other),
        }
    }
}
