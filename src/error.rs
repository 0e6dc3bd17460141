use thiserror::Error;

use crate::mobilize::RegistrarError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// The requested row does not exist, or is not owned by the requesting
    /// leader. Ownership mismatches deliberately fold into not-found.
    #[error("resource not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    /// The leader still has uncontacted assignments and may not request more.
    #[error("leader has outstanding assignments")]
    OutstandingAssignments,

    #[error("event registration failed: {0}")]
    Registration(#[from] RegistrarError),

    #[error("database error: {0}")]
    Database(diesel::result::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::NotFound,
            other => AppError::Database(other),
        }
    }
}
