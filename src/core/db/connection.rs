/// Connection Management Module
///
/// Opens the configured datasource, applies connection pragmas and tracks
/// transaction state. A `ConnectionManager` owns exactly one SQLite
/// connection behind a mutex; every client operation locks it for its whole
/// duration.

use crate::config::Settings;
use crate::core::error::TRANSACTION_API;
use crate::core::{FeedbaseError, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Interactive transaction or batch in progress
    Transaction,
    /// The last commit or rollback failed
    Failed,
}

impl TransactionState {
    /// Moves to `to`, logging the change.
    pub fn transition(&mut self, to: TransactionState) {
        debug!(from = ?*self, to = ?to, "Transaction state change");
        *self = to;
    }
}

/// Where a datasource URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datasource {
    Memory,
    File(String),
}

/// Parses a datasource URL: `file:path`, `sqlite:path`, `sqlite://path`,
/// a bare path, or `:memory:`.
pub fn parse_url(url: &str) -> Result<Datasource> {
    let url = url.trim();
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .or_else(|| url.strip_prefix("file:"))
        .unwrap_or(url);
    // query parameters such as `?mode=rwc` are not supported
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() {
        return Err(FeedbaseError::Config(format!("Invalid datasource url `{}`", url)));
    }
    if path == ":memory:" {
        Ok(Datasource::Memory)
    } else {
        Ok(Datasource::File(path.to_string()))
    }
}

/// Connection state guarded by the manager's mutex.
#[derive(Debug)]
pub struct DbState {
    pub connection: Connection,
    pub transaction_state: TransactionState,
}

/// Owns the client's SQLite connection.
#[derive(Debug)]
pub struct ConnectionManager {
    state: Mutex<DbState>,
    /// Thread running an interactive transaction, which holds `state`
    tx_owner: Mutex<Option<ThreadId>>,
    /// Path to the database file (None for in-memory databases)
    current_path: Option<String>,
}

impl ConnectionManager {
    /// Opens the datasource named by `settings.url` and applies pragmas.
    ///
    /// # Errors
    ///
    /// `FeedbaseError::Config` for a malformed URL, `FeedbaseError::Database`
    /// when SQLite cannot open the file or rejects a pragma.
    pub fn connect(settings: &Settings) -> Result<Self> {
        let (conn, current_path) = match parse_url(&settings.url)? {
            Datasource::Memory => (Connection::open_in_memory()?, None),
            Datasource::File(path) => (Connection::open(&path)?, Some(path)),
        };

        conn.pragma_update(None, "foreign_keys", settings.foreign_keys)?;
        conn.busy_timeout(settings.busy_timeout)?;
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            settings.journal_mode.as_str(),
            |row| row.get(0),
        )?;
        if current_path.is_some() && !mode.eq_ignore_ascii_case(&settings.journal_mode) {
            warn!(requested = %settings.journal_mode, actual = %mode, "journal_mode not applied");
        }

        info!(url = %settings.url, journal_mode = %mode, "Connected to database");
        Ok(ConnectionManager {
            state: Mutex::new(DbState {
                connection: conn,
                transaction_state: TransactionState::Autocommit,
            }),
            tx_owner: Mutex::new(None),
            current_path,
        })
    }

    /// Locks the connection for one operation.
    ///
    /// # Errors
    ///
    /// A `P2028` known request error when the calling thread is inside its
    /// own transaction closure, where waiting for the lock would never end.
    pub fn lock(&self) -> Result<MutexGuard<'_, DbState>> {
        if self.owned_by_current_thread() {
            return Err(FeedbaseError::KnownRequest {
                code: TRANSACTION_API,
                message: "The client was used inside its own transaction; run queries through the transaction handle instead"
                    .to_string(),
                meta: serde_json::json!({}),
            });
        }
        self.state.lock().map_err(|_| {
            FeedbaseError::Transaction("Connection lock poisoned by a panicking operation".to_string())
        })
    }

    /// Marks the calling thread as running a transaction until the returned
    /// guard drops. Call it while holding the lock.
    pub fn claim_transaction(&self) -> TransactionOwner<'_> {
        if let Ok(mut owner) = self.tx_owner.lock() {
            *owner = Some(thread::current().id());
        }
        TransactionOwner { owner: &self.tx_owner }
    }

    fn owned_by_current_thread(&self) -> bool {
        self.tx_owner
            .lock()
            .map(|owner| *owner == Some(thread::current().id()))
            .unwrap_or(false)
    }

    /// `Some(path)` for file databases, `None` for in-memory databases.
    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    /// Gets the current transaction state
    pub fn transaction_state(&self) -> TransactionState {
        if self.owned_by_current_thread() {
            return TransactionState::Transaction;
        }
        self.state
            .lock()
            .map(|g| g.transaction_state)
            .unwrap_or(TransactionState::Failed)
    }
}

/// Clears the transaction owner when dropped.
#[derive(Debug)]
pub struct TransactionOwner<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
}

impl Drop for TransactionOwner<'_> {
    fn drop(&mut self) {
        if let Ok(mut owner) = self.owner.lock() {
            *owner = None;
        }
    }
}

impl DbState {
    /// Records the outcome of a transaction.
    pub fn set_transaction_state(&mut self, state: TransactionState) {
        self.transaction_state.transition(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_variants() {
        assert_eq!(parse_url(":memory:").unwrap(), Datasource::Memory);
        assert_eq!(parse_url("file::memory:").unwrap(), Datasource::Memory);
        assert_eq!(
            parse_url("file:./dev.db").unwrap(),
            Datasource::File("./dev.db".to_string())
        );
        assert_eq!(
            parse_url("sqlite:///tmp/app.db").unwrap(),
            Datasource::File("/tmp/app.db".to_string())
        );
        assert_eq!(
            parse_url("data/feedback.db").unwrap(),
            Datasource::File("data/feedback.db".to_string())
        );
        assert!(matches!(parse_url("file:"), Err(FeedbaseError::Config(_))));
    }

    #[test]
    fn test_connect_in_memory_enables_foreign_keys() {
        let manager = ConnectionManager::connect(&Settings::for_url(":memory:")).unwrap();
        assert_eq!(manager.current_path(), None);
        assert_eq!(manager.transaction_state(), TransactionState::Autocommit);

        let guard = manager.lock().unwrap();
        let fk: i64 = guard
            .connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_connect_file_tracks_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let url = format!("file:{}", path.display());
        let manager = ConnectionManager::connect(&Settings::for_url(&url)).unwrap();
        assert_eq!(manager.current_path(), Some(path.to_str().unwrap()));
        assert!(path.exists());
    }

    #[test]
    fn test_connection_error_handling() {
        let result = ConnectionManager::connect(&Settings::for_url("/nonexistent/path/database.db"));
        match result.unwrap_err() {
            FeedbaseError::Database(_) => {} // Expected
            other => panic!("Expected Database error, got {:?}", other),
        }
    }

    #[test]
    fn test_transaction_state_updates() {
        let manager = ConnectionManager::connect(&Settings::for_url(":memory:")).unwrap();
        manager
            .lock()
            .unwrap()
            .set_transaction_state(TransactionState::Transaction);
        assert_eq!(manager.transaction_state(), TransactionState::Transaction);
    }

    #[test]
    fn test_owner_thread_cannot_relock() {
        let manager = ConnectionManager::connect(&Settings::for_url(":memory:")).unwrap();
        let guard = manager.lock().unwrap();
        let owner = manager.claim_transaction();

        let err = manager.lock().unwrap_err();
        assert_eq!(err.code(), Some(TRANSACTION_API));
        assert_eq!(manager.transaction_state(), TransactionState::Transaction);

        drop(owner);
        drop(guard);
        assert!(manager.lock().is_ok());
    }
}
