//! Error types for the survey import service.

use chrono::NaiveDate;

/// Failure talking to a measurement store or point directory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] postgres::Error),

    /// Required tables are not present in the connected database.
    #[error("database is missing tables: {}", .0.join(", "))]
    MissingTables(Vec<String>),

    /// Failure reported by a non-SQL backend.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Why a single measurement was not persisted.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// A row already exists for the measurement's identity key.
    #[error("row already exists with HydrologyID={hydrology_id} and DiversionDate={diversion_date}")]
    Duplicate {
        hydrology_id: i32,
        diversion_date: NaiveDate,
    },

    /// One or more required fields are missing or out of range.
    #[error("Invalid fields: {}", .fields.join(","))]
    Invalid { fields: Vec<&'static str> },

    /// Anything else the store reported. Fatal to the run.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Failure retrieving raw records from a measurement source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response status.
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    /// The service answered 200 with an error payload.
    #[error("{service} error {code}: {message}")]
    Api {
        service: &'static str,
        code: i64,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Failure installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot open log file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("logger already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Failure of a whole district import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
