use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    NotFound(String),

    #[error("no records matched batch prefix '{prefix}'")]
    NoMatchingRows { prefix: String, skipped: usize },

    #[error("no valid records found in data")]
    NoValidRows { diagnostics: Vec<String> },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        EngineError::BadParams(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound(message.into())
    }

    /// Stable code used in the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::BadParams(_) => "bad_params",
            EngineError::NotFound(_) => "not_found",
            EngineError::NoMatchingRows { .. } => "no_matching_rows",
            EngineError::NoValidRows { .. } => "no_valid_rows",
            EngineError::Db(_) => "db_query_failed",
            EngineError::Io(_) => "io_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::NoMatchingRows { prefix, skipped } => Some(serde_json::json!({
                "prefix": prefix,
                "skipped": skipped,
            })),
            EngineError::NoValidRows { diagnostics } if !diagnostics.is_empty() => {
                Some(serde_json::json!({ "errors": diagnostics }))
            }
            _ => None,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
