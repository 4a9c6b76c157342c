/// Feedbase Error Module
///
/// This module defines the error type shared by every layer of the client.
/// Engine failures that correspond to a well-known request problem (unique
/// violations, missing records, foreign key failures) are surfaced as
/// `KnownRequest` errors carrying a stable `P` code so callers can branch on
/// them without parsing messages.
use rusqlite::ffi;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Unique constraint failed.
pub const UNIQUE_CONSTRAINT: &str = "P2002";
/// Foreign key constraint failed.
pub const FOREIGN_KEY_CONSTRAINT: &str = "P2003";
/// Null constraint violation.
pub const NULL_CONSTRAINT: &str = "P2011";
/// An operation failed because it depends on records that were not found.
pub const RECORD_NOT_FOUND: &str = "P2025";
/// Transaction API error, including interactive transaction timeouts.
pub const TRANSACTION_API: &str = "P2028";

/// Comprehensive error type for the feedbase client.
///
/// This enum covers all error scenarios that can occur within the client:
/// - Known request failures with stable codes
/// - Argument validation (unknown models, fields, bad values)
/// - Raw database failures that could not be classified
/// - Configuration, schema and transaction management
#[derive(Error, Debug)]
pub enum FeedbaseError {
    /// A request failed for a reason the client recognises
    #[error("{message} (code {code})")]
    KnownRequest {
        code: &'static str,
        message: String,
        meta: JsonValue,
    },

    /// Arguments did not match the schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database-related errors from SQLite operations
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Raw SQL errors (multiple statements, wrong statement kind)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing and serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transaction-related errors
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Schema registry and migration errors
    #[error("Schema error: {0}")]
    Schema(String),
}

impl FeedbaseError {
    /// Builds a `P2025` error for the given model.
    pub fn not_found(model: &str, cause: &str) -> Self {
        FeedbaseError::KnownRequest {
            code: RECORD_NOT_FOUND,
            message: format!("No {} found: {}", model, cause),
            meta: serde_json::json!({ "modelName": model, "cause": cause }),
        }
    }

    /// Returns the known request code, if this error carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            FeedbaseError::KnownRequest { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(RECORD_NOT_FOUND)
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_CONSTRAINT)
    }
}

/// Maps a SQLite failure to a known request error when the extended result
/// code identifies a constraint violation. Anything else stays a
/// `Database` error.
pub fn classify(err: rusqlite::Error) -> FeedbaseError {
    let (code, detail) = match &err {
        rusqlite::Error::SqliteFailure(e, msg) => (e.extended_code, msg.clone().unwrap_or_default()),
        _ => return FeedbaseError::Database(err),
    };

    match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            let target = constraint_columns(&detail);
            FeedbaseError::KnownRequest {
                code: UNIQUE_CONSTRAINT,
                message: format!("Unique constraint failed on the fields: ({})", target.join(",")),
                meta: serde_json::json!({ "target": target }),
            }
        }
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => FeedbaseError::KnownRequest {
            code: FOREIGN_KEY_CONSTRAINT,
            message: "Foreign key constraint failed".to_string(),
            meta: serde_json::json!({ "detail": detail }),
        },
        ffi::SQLITE_CONSTRAINT_NOTNULL => {
            let target = constraint_columns(&detail);
            FeedbaseError::KnownRequest {
                code: NULL_CONSTRAINT,
                message: format!("Null constraint violation on the fields: ({})", target.join(",")),
                meta: serde_json::json!({ "constraint": target }),
            }
        }
        _ => FeedbaseError::Database(err),
    }
}

/// Extracts column names from a SQLite constraint message such as
/// `UNIQUE constraint failed: User.email, User.name`.
fn constraint_columns(detail: &str) -> Vec<String> {
    detail
        .split_once(':')
        .map(|(_, cols)| {
            cols.split(',')
                .map(|c| {
                    let c = c.trim();
                    c.rsplit_once('.').map(|(_, col)| col).unwrap_or(c).to_string()
                })
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Type alias for Result to use FeedbaseError as the error type.
pub type Result<T> = std::result::Result<T, FeedbaseError>;
