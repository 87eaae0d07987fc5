//! Domain types for rewriteq

pub mod id;
mod task;

pub use id::{generate_id, generate_storage_id};
pub use task::{ERROR_MARKER_PREFIX, QaPair, RewriteTask, TaskStatus};
