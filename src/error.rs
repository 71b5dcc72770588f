use thiserror::Error;

/// Errors surfaced by the store adapters and the course repository.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    #[error("Invalid course code: {0}")]
    InvalidCourseCode(String),
    #[error("Invalid grade level: {0} (expected 0-13)")]
    InvalidGradeLevel(u8),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Object store error: {0}")]
    ObjectStore(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn already_exists(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity_type,
            id: id.into(),
        }
    }

    /// Validation failures are the caller's problem and are not logged as
    /// system errors.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCourseCode(_) | Self::InvalidGradeLevel(_) | Self::InvalidData(_)
        )
    }
}

impl From<serde_dynamo::Error> for RepositoryError {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
