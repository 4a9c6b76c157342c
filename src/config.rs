use crate::core::{FeedbaseError, Result};
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `[datasource] url`.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub datasource: Option<DatasourceConfig>,
    pub client: Option<ClientConfig>,
}

/// Where the database lives and how the connection is set up.
#[derive(Debug, Default, Deserialize)]
pub struct DatasourceConfig {
    pub url: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub journal_mode: Option<String>,
    pub foreign_keys: Option<bool>,
}

/// Client behaviour.
#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    pub id_strategy: Option<IdStrategy>,
    pub log_queries: Option<bool>,
    pub slow_query_ms: Option<u64>,
    pub transaction_timeout_ms: Option<u64>,
    pub transaction_behavior: Option<TxBehavior>,
}

/// How default ids are generated on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    #[default]
    Cuid,
    Uuid,
}

/// Locking mode used when an interactive transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxBehavior {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl From<TxBehavior> for TransactionBehavior {
    fn from(behavior: TxBehavior) -> Self {
        match behavior {
            TxBehavior::Deferred => TransactionBehavior::Deferred,
            TxBehavior::Immediate => TransactionBehavior::Immediate,
            TxBehavior::Exclusive => TransactionBehavior::Exclusive,
        }
    }
}

/// Fully resolved settings with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub url: String,
    pub busy_timeout: Duration,
    pub journal_mode: String,
    pub foreign_keys: bool,
    pub id_strategy: IdStrategy,
    pub log_queries: bool,
    pub slow_query: Duration,
    pub transaction_timeout: Duration,
    pub transaction_behavior: TxBehavior,
}

impl Settings {
    /// Default settings for the given datasource URL.
    pub fn for_url(url: &str) -> Self {
        Settings {
            url: url.to_string(),
            busy_timeout: Duration::from_millis(5_000),
            journal_mode: "WAL".to_string(),
            foreign_keys: true,
            id_strategy: IdStrategy::default(),
            log_queries: false,
            slow_query: Duration::from_millis(500),
            transaction_timeout: Duration::from_millis(5_000),
            transaction_behavior: TxBehavior::default(),
        }
    }
}

impl Config {
    /// Applies environment overrides using the process environment.
    pub fn with_process_env(self) -> Self {
        self.with_env(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.datasource.get_or_insert_with(DatasourceConfig::default).url = Some(url);
        }
        self
    }

    /// Overrides the datasource URL, as the CLI `--url` flag does.
    pub fn with_url(mut self, url: &str) -> Self {
        self.datasource.get_or_insert_with(DatasourceConfig::default).url = Some(url.to_string());
        self
    }

    /// Resolves defaults. Fails when no datasource URL is configured.
    pub fn settings(&self) -> Result<Settings> {
        let datasource = self.datasource.as_ref();
        let url = datasource.and_then(|d| d.url.clone()).ok_or_else(|| {
            FeedbaseError::Config(format!(
                "No datasource url configured; set {}, pass --url or add `url` under [datasource]",
                DATABASE_URL_ENV
            ))
        })?;

        let mut settings = Settings::for_url(&url);
        if let Some(d) = datasource {
            if let Some(ms) = d.busy_timeout_ms {
                settings.busy_timeout = Duration::from_millis(ms);
            }
            if let Some(mode) = &d.journal_mode {
                validate_journal_mode(mode)?;
                settings.journal_mode = mode.to_uppercase();
            }
            if let Some(fk) = d.foreign_keys {
                settings.foreign_keys = fk;
            }
        }
        if let Some(c) = &self.client {
            if let Some(strategy) = c.id_strategy {
                settings.id_strategy = strategy;
            }
            if let Some(log) = c.log_queries {
                settings.log_queries = log;
            }
            if let Some(ms) = c.slow_query_ms {
                settings.slow_query = Duration::from_millis(ms);
            }
            if let Some(ms) = c.transaction_timeout_ms {
                settings.transaction_timeout = Duration::from_millis(ms);
            }
            if let Some(behavior) = c.transaction_behavior {
                settings.transaction_behavior = behavior;
            }
        }
        Ok(settings)
    }
}

fn validate_journal_mode(mode: &str) -> Result<()> {
    const MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
    if MODES.contains(&mode.to_uppercase().as_str()) {
        Ok(())
    } else {
        Err(FeedbaseError::Config(format!(
            "Unknown journal_mode `{}`; expected one of {}",
            mode,
            MODES.join(", ")
        )))
    }
}

/// `<config dir>/feedbase/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feedbase").join("config.toml"))
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = feedbase::config::load_config("feedbase.toml").unwrap();
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| FeedbaseError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| FeedbaseError::Config(e.to_string()))
}

/// Loads the explicit path if given, otherwise the default path when it
/// exists, otherwise an empty configuration. Environment overrides are
/// applied last.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(p) => load_config(p)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => load_config(p)?,
            None => Config::default(),
        },
    };
    Ok(config.with_process_env())
}
