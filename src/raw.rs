/// Raw SQL Module
///
/// The escape hatch around the query builder. `Sql` assembles a statement
/// from literal fragments and bound values so user input never ends up in
/// the SQL text:
///
/// ```
/// use feedbase::raw::Sql;
///
/// let status = "OPEN";
/// let query = Sql::new(r#"SELECT "id" FROM "Feedback" WHERE "status" = "#)
///     .bind(status)
///     .push(" LIMIT ")
///     .bind(10);
/// let stmt = query.render();
/// assert_eq!(stmt.sql, r#"SELECT "id" FROM "Feedback" WHERE "status" = ?1 LIMIT ?2"#);
/// ```
///
/// Only `Sql::raw` accepts text built at runtime, and it is interpolated
/// verbatim.
use crate::core::db::{QueryExecutor, QueryResult, StatementType};
use crate::core::{FeedbaseError, Result};
use crate::query::Statement;
use crate::value::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Value(Value),
}

/// A SQL statement under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    pieces: Vec<Piece>,
}

impl Sql {
    /// Starts from a literal SQL fragment.
    pub fn new(text: &'static str) -> Self {
        Sql::empty().push(text)
    }

    pub fn empty() -> Self {
        Sql::default()
    }

    /// Text that is NOT escaped or parameterised. Never pass user input.
    pub fn raw(text: impl Into<String>) -> Self {
        Sql {
            pieces: vec![Piece::Text(text.into())],
        }
    }

    pub fn push(mut self, text: &'static str) -> Self {
        self.pieces.push(Piece::Text(text.to_string()));
        self
    }

    /// Appends a bound parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.pieces.push(Piece::Value(value.into()));
        self
    }

    pub fn append(mut self, other: Sql) -> Self {
        self.pieces.extend(other.pieces);
        self
    }

    /// Joins fragments with a literal separator, e.g. values of an `IN` list.
    pub fn join<I>(items: I, separator: &'static str) -> Sql
    where
        I: IntoIterator<Item = Sql>,
    {
        let mut out = Sql::empty();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                out = out.push(separator);
            }
            out = out.append(item);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.iter().all(|p| matches!(p, Piece::Text(t) if t.is_empty()))
    }

    /// Renders numbered `?N` placeholders and collects the bound values.
    pub fn render(&self) -> Statement {
        let mut sql = String::new();
        let mut params = Vec::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Value(value) => {
                    params.push(value.clone());
                    sql.push_str(&format!("?{}", params.len()));
                }
            }
        }
        Statement { sql, params }
    }
}

impl From<&'static str> for Sql {
    fn from(text: &'static str) -> Self {
        Sql::new(text)
    }
}

impl From<Sql> for Statement {
    fn from(sql: Sql) -> Self {
        sql.render()
    }
}

fn reject_transaction_control(stmt: &Statement) -> Result<()> {
    if StatementType::from_sql(&stmt.sql) == StatementType::Transaction {
        return Err(FeedbaseError::Query(
            "Transaction control statements are not allowed in raw queries, use `transaction` instead"
                .to_string(),
        ));
    }
    Ok(())
}

/// Runs a single row-returning statement and returns its rows as JSON
/// objects.
pub fn query_raw(exec: &QueryExecutor<'_>, stmt: &Statement) -> Result<QueryResult> {
    reject_transaction_control(stmt)?;
    keep_transaction_state(exec, || exec.query_json(stmt))
}

/// Runs a single statement that returns no rows and reports how many rows
/// it affected.
pub fn execute_raw(exec: &QueryExecutor<'_>, stmt: &Statement) -> Result<usize> {
    reject_transaction_control(stmt)?;
    let returns_rows = exec.prepare(&stmt.sql)?.column_count() > 0;
    if returns_rows {
        return Err(FeedbaseError::Query(
            "`execute_raw` does not accept statements that return rows, use `query_raw`".to_string(),
        ));
    }
    keep_transaction_state(exec, || exec.execute(stmt))
}

/// Runs `run` and fails if it opened or closed a transaction, restoring the
/// connection to the mode it started in.
fn keep_transaction_state<T>(exec: &QueryExecutor<'_>, run: impl FnOnce() -> Result<T>) -> Result<T> {
    let conn = exec.connection();
    let was_autocommit = conn.is_autocommit();
    let result = run();
    if conn.is_autocommit() == was_autocommit {
        return result;
    }

    let restore = if was_autocommit { "ROLLBACK" } else { "BEGIN" };
    if let Err(e) = conn.execute_batch(restore) {
        warn!(error = %e, restore, "Could not restore transaction state after raw statement");
    }
    Err(FeedbaseError::Query(
        "Raw statement changed the transaction state, use `transaction` instead".to_string(),
    ))
}
