//! Storage error type and its conversion into the core error.

use bistro_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db_error = match err {
            StorageError::Query(diesel::result::Error::NotFound) => {
                DatabaseError::NotFound("Record not found".to_string())
            }
            StorageError::Query(e) => DatabaseError::QueryFailed(e.to_string()),
            StorageError::Pool(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Connection(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Migration(message) => DatabaseError::MigrationFailed(message),
            StorageError::Io(e) => DatabaseError::Internal(e.to_string()),
        };
        Error::Database(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_database_not_found() {
        let err: Error = StorageError::from(diesel::result::Error::NotFound).into();
        assert!(matches!(err, Error::Database(DatabaseError::NotFound(_))));
    }
}
