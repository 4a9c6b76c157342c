/// Core Module for feedbase
///
/// Shared infrastructure underneath the client: the SQLite connection layer,
/// statement execution with query logging, schema introspection and the
/// crate-wide error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{FeedbaseError, Result};
