/// Database Module
///
/// The SQLite layer underneath the client, split into three concerns:
/// - **Connection Management** (`connection.rs`): opening a datasource URL,
///   connection pragmas and transaction state
/// - **Schema Introspection** (`schema.rs`): reading the live table layout
///   back out of SQLite for drift detection
/// - **Query Execution** (`query.rs`): running compiled statements with
///   query logging and error classification
///
/// All database operations return the crate's `FeedbaseError`; constraint
/// failures are classified into known request errors on the way out.
pub mod connection;
pub mod query;
pub mod schema;

pub use connection::*;
pub use query::*;
pub use schema::*;
