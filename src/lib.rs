// Core infrastructure modules
pub mod config;
pub mod core;
pub mod ids;
pub mod value;

// Schema, query building and execution
pub mod engine;
pub mod query;
pub mod raw;
pub mod request;
pub mod schema;

// Public client and operator surfaces
pub mod client;
pub mod repl;
pub mod schema_map;

#[cfg(test)]
pub mod test_utils;

/// Commonly used types for application code.
pub mod prelude {
    pub use crate::client::models::*;
    pub use crate::client::{Client, Delegate, Queryable, TxClient};
    pub use crate::config::{Config, Settings};
    pub use crate::core::{FeedbaseError, Result};
    pub use crate::query::{
        AggregateArgs, Aggregates, CountArgs, CreateArgs, CreateManyArgs, Data, DeleteManyArgs,
        Direction, Filter, FindManyArgs, FindUniqueArgs, GroupByArgs, NullsOrder, OrderBy,
        UpdateArgs, UpdateData, UpdateManyArgs, UpsertArgs,
    };
    pub use crate::raw::Sql;
    pub use crate::request::{Action, JsonRequest};
}
