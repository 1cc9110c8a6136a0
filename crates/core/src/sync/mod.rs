//! Cloud sync domain models, scheduler constants and store contracts.

mod cloud_sync_scheduler;
mod sync_queue_model;

pub use cloud_sync_scheduler::*;
pub use sync_queue_model::*;
