//! SQLite storage for the point-of-sale backend: connection pool, serialized
//! writer, settings and the cloud sync outbox.

pub mod db;
pub mod errors;
pub mod schema;
pub mod settings;
pub mod sync;

pub use errors::StorageError;
