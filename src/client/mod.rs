/// Client Module
///
/// The public entry point of the crate. A `Client` owns the SQLite
/// connection and hands out typed per-model delegates:
///
/// ```no_run
/// use feedbase::client::{Client, Queryable};
/// use feedbase::query::{Filter, FindManyArgs, OrderBy};
///
/// # fn main() -> feedbase::core::Result<()> {
/// let client = Client::from_url("file:feedbase.db")?;
/// client.push_schema()?;
/// let open = client.feedback().find_many(
///     FindManyArgs::new()
///         .filter(Filter::field("status").equals("OPEN"))
///         .order_by(OrderBy::desc("votes"))
///         .take(10),
/// )?;
/// # Ok(())
/// # }
/// ```
///
/// Every call locks the connection for its whole duration. `transaction`
/// holds the lock until the closure returns and commits or rolls back
/// depending on its result.
pub mod delegate;
pub mod models;

pub use delegate::Delegate;
pub use models::*;

use crate::config::{Config, Settings, TxBehavior};
use crate::core::db::{ConnectionManager, DbState, QueryExecutor, QueryLogging, TransactionState};
use crate::core::error::{classify, TRANSACTION_API};
use crate::core::{FeedbaseError, Result};
use crate::engine::{Engine, Record};
use crate::raw::{self, Sql};
use crate::request::{dispatch, Action, JsonRequest};
use crate::schema::diff::{self, SchemaComparison};
use crate::schema::ddl;
use rusqlite::{Connection, Transaction};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{info, warn};

/// Anything operations can run against: the client itself or an open
/// transaction.
pub trait Queryable {
    /// Runs `f` with an engine bound to this handle's connection.
    fn with_engine<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Engine<'_>) -> Result<T>;

    /// Runs one JSON protocol request.
    fn execute_request(&self, request: &JsonRequest) -> Result<JsonValue> {
        self.with_engine(|engine| dispatch(engine, request))
    }

    /// JSON protocol entry point, e.g. `("feedback", Action::FindMany, args)`.
    fn execute_json(&self, model: Option<&str>, action: Action, args: JsonValue) -> Result<JsonValue> {
        self.execute_request(&JsonRequest::new(model, action, args))
    }

    /// Runs a row-returning statement and returns its rows as JSON objects.
    fn query_raw(&self, sql: Sql) -> Result<Vec<Record>> {
        let stmt = sql.render();
        self.with_engine(|engine| Ok(raw::query_raw(&engine.executor(), &stmt)?.rows))
    }

    /// `query_raw`, deserializing each row into `T`.
    fn query_raw_as<T: DeserializeOwned>(&self, sql: Sql) -> Result<Vec<T>> {
        self.query_raw(sql)?
            .into_iter()
            .map(|row| Ok(serde_json::from_value(JsonValue::Object(row))?))
            .collect()
    }

    /// Runs a statement that returns no rows; yields the affected row count.
    fn execute_raw(&self, sql: Sql) -> Result<usize> {
        let stmt = sql.render();
        self.with_engine(|engine| raw::execute_raw(&engine.executor(), &stmt))
    }

    fn user(&self) -> Delegate<'_, User, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn session(&self) -> Delegate<'_, Session, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn account(&self) -> Delegate<'_, Account, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn verification(&self) -> Delegate<'_, Verification, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn organization(&self) -> Delegate<'_, Organization, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn webhook(&self) -> Delegate<'_, Webhook, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn organization_member(&self) -> Delegate<'_, OrganizationMember, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn project(&self) -> Delegate<'_, Project, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }

    fn feedback(&self) -> Delegate<'_, Feedback, Self>
    where
        Self: Sized,
    {
        Delegate::new(self)
    }
}

fn query_logging(settings: &Settings) -> QueryLogging {
    QueryLogging {
        log_queries: settings.log_queries,
        slow_query: settings.slow_query,
    }
}

fn engine<'c>(conn: &'c Connection, settings: &Settings) -> Engine<'c> {
    Engine::new(
        QueryExecutor::with_logging(conn, query_logging(settings)),
        settings.id_strategy,
    )
}

/// Owns the connection and the resolved settings.
#[derive(Debug)]
pub struct Client {
    manager: ConnectionManager,
    settings: Settings,
}

impl Client {
    /// Connects using a loaded configuration.
    pub fn open(config: &Config) -> Result<Self> {
        Client::connect(config.settings()?)
    }

    pub fn connect(settings: Settings) -> Result<Self> {
        let manager = ConnectionManager::connect(&settings)?;
        Ok(Client { manager, settings })
    }

    /// Connects to `url` with default settings.
    pub fn from_url(url: &str) -> Result<Self> {
        Client::connect(Settings::for_url(url))
    }

    /// A private in-memory database, mostly useful for tests.
    pub fn in_memory() -> Result<Self> {
        Client::from_url(":memory:")
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.manager.transaction_state()
    }

    /// Creates any missing tables and indexes.
    pub fn push_schema(&self) -> Result<()> {
        let state = self.manager.lock()?;
        ddl::push(&state.connection)
    }

    /// Compares the live database against the registry.
    pub fn verify_schema(&self) -> Result<SchemaComparison> {
        let state = self.manager.lock()?;
        diff::verify(&state.connection)
    }

    /// Runs `f` inside a transaction begun with the configured behaviour.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxClient<'_>) -> Result<T>,
    {
        self.transaction_with_behavior(self.settings.transaction_behavior, f)
    }

    /// Runs `f` inside a transaction. Commits when `f` returns `Ok`, rolls
    /// back when it returns `Err` or ran past `transaction_timeout`.
    ///
    /// # Errors
    ///
    /// The closure's error after rolling back, or a `P2028` known request
    /// error when the timeout expired.
    pub fn transaction_with_behavior<T, F>(&self, behavior: TxBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&TxClient<'_>) -> Result<T>,
    {
        let mut guard = self.manager.lock()?;
        let _owner = self.manager.claim_transaction();
        let DbState {
            connection,
            transaction_state,
        } = &mut *guard;
        let timeout = self.settings.transaction_timeout;

        transaction_state.transition(TransactionState::Transaction);
        let started = Instant::now();
        let tx = match connection.transaction_with_behavior(behavior.into()) {
            Ok(tx) => tx,
            Err(e) => {
                transaction_state.transition(TransactionState::Failed);
                return Err(classify(e));
            }
        };
        info!(?behavior, "Transaction started");

        let result = f(&TxClient {
            conn: &tx,
            settings: &self.settings,
        });
        let elapsed = started.elapsed();

        match result {
            Ok(_) if elapsed > timeout => {
                roll_back(tx, transaction_state)?;
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    timeout_ms = timeout.as_millis() as u64,
                    "Transaction rolled back after timeout"
                );
                Err(FeedbaseError::KnownRequest {
                    code: TRANSACTION_API,
                    message: format!(
                        "Transaction already closed: it ran for {} ms, exceeding the timeout of {} ms",
                        elapsed.as_millis(),
                        timeout.as_millis()
                    ),
                    meta: serde_json::json!({
                        "elapsedMs": elapsed.as_millis() as u64,
                        "timeoutMs": timeout.as_millis() as u64,
                    }),
                })
            }
            Ok(value) => match tx.commit() {
                Ok(()) => {
                    transaction_state.transition(TransactionState::Autocommit);
                    info!(elapsed_ms = elapsed.as_millis() as u64, "Transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    transaction_state.transition(TransactionState::Failed);
                    warn!(error = %e, "Transaction commit failed");
                    Err(classify(e))
                }
            },
            Err(err) => {
                // the closure's error wins over a failed rollback
                let _ = roll_back(tx, transaction_state);
                warn!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    /// Runs every request in one transaction and returns their results in
    /// order. A failing request rolls back all of them.
    pub fn batch(&self, requests: &[JsonRequest]) -> Result<Vec<JsonValue>> {
        self.transaction(|tx| {
            requests
                .iter()
                .map(|request| tx.execute_request(request))
                .collect()
        })
    }
}

/// Rolls `tx` back. The connection is back in autocommit afterwards unless
/// the rollback itself failed.
fn roll_back(tx: Transaction<'_>, state: &mut TransactionState) -> Result<()> {
    match tx.rollback() {
        Ok(()) => {
            state.transition(TransactionState::Autocommit);
            Ok(())
        }
        Err(e) => {
            state.transition(TransactionState::Failed);
            warn!(error = %e, "Transaction rollback failed");
            Err(classify(e))
        }
    }
}

impl Queryable for Client {
    fn with_engine<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Engine<'_>) -> Result<T>,
    {
        let state = self.manager.lock()?;
        f(&engine(&state.connection, &self.settings))
    }
}

/// Handle passed to a transaction closure. Operations run on the open
/// transaction and share its fate.
pub struct TxClient<'c> {
    conn: &'c Connection,
    settings: &'c Settings,
}

impl Queryable for TxClient<'_> {
    fn with_engine<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Engine<'_>) -> Result<T>,
    {
        f(&engine(self.conn, self.settings))
    }
}
