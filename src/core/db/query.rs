/// Query Execution Module
///
/// Runs compiled statements against a borrowed connection. Every statement
/// is timed and logged; constraint failures are classified into known
/// request errors before they leave this layer.

use crate::core::error::classify;
use crate::core::{FeedbaseError, Result};
use crate::query::compile::Statement;
use crate::value::decode_any;
use rusqlite::{params_from_iter, Batch, Connection, Row};
use serde_json::{Map, Value as JsonValue};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Controls how executed statements are logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryLogging {
    /// Log every statement at `info` instead of `debug`
    pub log_queries: bool,
    /// Statements slower than this are logged at `warn`
    pub slow_query: Duration,
}

impl Default for QueryLogging {
    fn default() -> Self {
        QueryLogging {
            log_queries: false,
            slow_query: Duration::from_millis(500),
        }
    }
}

/// Rows returned by a raw query, keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Map<String, JsonValue>>) -> Self {
        let row_count = rows.len();
        QueryResult {
            columns,
            rows,
            row_count,
        }
    }
}

/// Query execution service that operates on a database connection
#[derive(Clone, Copy)]
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
    logging: QueryLogging,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        Self::with_logging(connection, QueryLogging::default())
    }

    pub fn with_logging(connection: &'a Connection, logging: QueryLogging) -> Self {
        QueryExecutor { connection, logging }
    }

    pub fn connection(&self) -> &'a Connection {
        self.connection
    }

    /// Runs a row-returning statement, mapping each row with `f`.
    pub fn query_map<T, F>(&self, stmt: &Statement, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let started = Instant::now();
        let mut prepared = self.connection.prepare(&stmt.sql).map_err(classify)?;
        let rows = prepared
            .query_map(params_from_iter(stmt.params.iter()), |row| f(row))
            .map_err(classify)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(classify)?;
        self.log(stmt, started, rows.len());
        Ok(rows)
    }

    /// Runs a statement expected to return at most one row.
    pub fn query_opt<T, F>(&self, stmt: &Statement, f: F) -> Result<Option<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.query_map(stmt, f)?.into_iter().next())
    }

    /// Runs a statement that does not return rows and reports the number of
    /// affected rows.
    pub fn execute(&self, stmt: &Statement) -> Result<usize> {
        let started = Instant::now();
        let affected = self
            .connection
            .execute(&stmt.sql, params_from_iter(stmt.params.iter()))
            .map_err(classify)?;
        self.log(stmt, started, affected);
        Ok(affected)
    }

    /// Runs arbitrary row-returning SQL, decoding columns without schema
    /// information.
    pub fn query_json(&self, stmt: &Statement) -> Result<QueryResult> {
        let started = Instant::now();
        let mut prepared = self.prepare(&stmt.sql)?;
        let columns: Vec<String> = prepared.column_names().into_iter().map(String::from).collect();

        let rows = prepared
            .query_map(params_from_iter(stmt.params.iter()), |row| {
                let mut map = Map::new();
                for (i, name) in columns.iter().enumerate() {
                    map.insert(name.clone(), decode_any(row.get_ref(i)?));
                }
                Ok(map)
            })
            .map_err(classify)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(classify)?;
        self.log(stmt, started, rows.len());
        Ok(QueryResult::new(columns, rows))
    }

    /// Prepares a single statement. Input holding more than one statement is
    /// rejected.
    pub fn prepare(&self, sql: &str) -> Result<rusqlite::Statement<'a>> {
        let multiple = || FeedbaseError::Query("Raw queries accept exactly one statement".to_string());
        let mut batch = Batch::new(self.connection, sql);
        let first = match batch.next() {
            Ok(Some(stmt)) => stmt,
            Ok(None) => return Err(FeedbaseError::Query("Empty statement".to_string())),
            Err(rusqlite::Error::MultipleStatement) => return Err(multiple()),
            Err(e) => return Err(classify(e)),
        };
        match batch.next() {
            Ok(None) => Ok(first),
            Ok(Some(_)) | Err(_) => Err(multiple()),
        }
    }

    fn log(&self, stmt: &Statement, started: Instant, rows: usize) {
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed >= self.logging.slow_query {
            warn!(sql = %stmt.sql, params = stmt.params.len(), rows, elapsed_ms, "Slow query");
        } else if self.logging.log_queries {
            info!(sql = %stmt.sql, params = stmt.params.len(), rows, elapsed_ms, "Query");
        } else {
            debug!(sql = %stmt.sql, params = stmt.params.len(), rows, elapsed_ms, "Query");
        }
    }
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    /// CREATE/DROP/ALTER
    Ddl,
    /// BEGIN/COMMIT/ROLLBACK/SAVEPOINT/RELEASE
    Transaction,
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let keyword = skip_leading_comments(sql)
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or("")
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementType::Select,
            "INSERT" | "REPLACE" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" | "DROP" | "ALTER" => StatementType::Ddl,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementType::Transaction
            }
            _ => StatementType::Other,
        }
    }
}

/// Skips whitespace, empty statements and `--` / `/* */` comments before the
/// first keyword.
fn skip_leading_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return sql;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use rusqlite::Connection;
    use serde_json::json;

    fn setup_test_table(conn: &Connection) {
        conn.execute_batch(
            "
            CREATE TABLE test (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE,
                value REAL
            );
            INSERT INTO test (name, value) VALUES ('Alice', 123.5);
            INSERT INTO test (name, value) VALUES ('Bob', 678.25);
            INSERT INTO test (name, value) VALUES (NULL, NULL);
        ",
        )
        .unwrap();
    }

    fn stmt(sql: &str, params: Vec<Value>) -> Statement {
        Statement {
            sql: sql.to_string(),
            params,
        }
    }

    #[test]
    fn test_query_json() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let executor = QueryExecutor::new(&conn);
        let result = executor
            .query_json(&stmt("SELECT * FROM test ORDER BY id", vec![]))
            .unwrap();

        assert_eq!(result.columns, vec!["id", "name", "value"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(
            JsonValue::Object(result.rows[0].clone()),
            json!({"id": 1, "name": "Alice", "value": 123.5})
        );
        assert_eq!(result.rows[2]["name"], JsonValue::Null);
    }

    #[test]
    fn test_bound_parameters() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let executor = QueryExecutor::new(&conn);
        let names = executor
            .query_map(
                &stmt("SELECT name FROM test WHERE value > ?1", vec![Value::Float(200.0)]),
                |row| row.get::<_, String>(0),
            )
            .unwrap();
        assert_eq!(names, vec!["Bob"]);
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let executor = QueryExecutor::new(&conn);
        let err = executor
            .execute(&stmt("INSERT INTO test (name) VALUES (?1)", vec![Value::from("Alice")]))
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let executor = QueryExecutor::new(&conn);
        let result = executor.query_json(&stmt("SELECT 1; SELECT 2", vec![]));
        match result.unwrap_err() {
            FeedbaseError::Query(msg) => assert!(msg.contains("exactly one")),
            other => panic!("Expected Query error, got {:?}", other),
        }
    }

    #[test]
    fn test_query_error_handling() {
        let conn = Connection::open_in_memory().unwrap();
        let executor = QueryExecutor::new(&conn);
        let result = executor.query_json(&stmt("SELECT * FROM nonexistent_table", vec![]));
        match result.unwrap_err() {
            FeedbaseError::Database(e) => assert!(e.to_string().contains("no such table")),
            other => panic!("Expected Database error, got {:?}", other),
        }
    }

    #[test]
    fn test_statement_type_classification() {
        assert_eq!(StatementType::from_sql("SELECT * FROM users"), StatementType::Select);
        assert_eq!(StatementType::from_sql("  with x as (select 1) select * from x"), StatementType::Select);
        assert_eq!(StatementType::from_sql("INSERT INTO users VALUES (1)"), StatementType::Insert);
        assert_eq!(StatementType::from_sql("UPDATE users SET name = 'new'"), StatementType::Update);
        assert_eq!(StatementType::from_sql("DELETE FROM users"), StatementType::Delete);
        assert_eq!(StatementType::from_sql("DROP TABLE test"), StatementType::Ddl);
        assert_eq!(StatementType::from_sql("BEGIN"), StatementType::Transaction);
        assert_eq!(StatementType::from_sql("commit;"), StatementType::Transaction);
        assert_eq!(StatementType::from_sql("SAVEPOINT sp1"), StatementType::Transaction);
        assert_eq!(StatementType::from_sql("PRAGMA foreign_keys = ON"), StatementType::Other);
    }

    #[test]
    fn test_statement_type_skips_leading_comments() {
        assert_eq!(StatementType::from_sql("/* c */ BEGIN"), StatementType::Transaction);
        assert_eq!(StatementType::from_sql("-- x\nCOMMIT"), StatementType::Transaction);
        assert_eq!(StatementType::from_sql(" ; /* a */ -- b\n  rollback"), StatementType::Transaction);
        assert_eq!(StatementType::from_sql("/* BEGIN */ SELECT 1"), StatementType::Select);
        assert_eq!(StatementType::from_sql("-- only a comment"), StatementType::Other);
        assert_eq!(StatementType::from_sql("/* unterminated"), StatementType::Other);
    }
}
