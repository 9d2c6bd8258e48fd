use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The notebook store could not be opened or initialized. Fatal at startup.
    #[error("Failed to open notebook store at {path}: {source}")]
    StoreOpen {
        path: String,
        #[source]
        source: tokio_rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Notebook not found: {0}")]
    NotebookNotFound(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("{0}")]
    LlmApi(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::StoreOpen { .. })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
