use bankfeed_core::ErrorCause;
use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} already exists")]
    Exists { entity: &'static str },
    #[error("{entity} is still referenced or references a missing row")]
    Constraint { entity: &'static str },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StorageError {
    /// Classifies a driver error raised while writing `entity`.
    pub fn classify(err: sqlx::Error, entity: &'static str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation => return StorageError::Exists { entity },
                ErrorKind::ForeignKeyViolation => return StorageError::Constraint { entity },
                _ => {}
            }
        }
        StorageError::Database(err)
    }

    pub fn cause(&self) -> ErrorCause {
        match self {
            StorageError::Exists { .. } => ErrorCause::Exists,
            StorageError::Constraint { .. } => ErrorCause::Constrain,
            StorageError::NotFound { .. } | StorageError::Database(_) => ErrorCause::Unknown,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::classify(err, "record")
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
