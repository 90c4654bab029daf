use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Query failed: {source}\n  in: {sql}")]
    Execution {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown field '{key}' on table '{table}'")]
    UnknownField { table: String, key: String },

    #[error("Invalid value '{value}' for filter '{filter}'")]
    InvalidFilterValue { filter: String, value: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;
