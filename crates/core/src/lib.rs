//! Domain model and store contracts shared by the point-of-sale backend crates.

pub mod errors;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
