use crate::plugins::spouse::{FETCH_FAILED, NO_CANDIDATES, NO_GROUP};

/// Failures of a draw request. None of these are fatal, every one maps to a
/// message the host can show to the user.
#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("daily draw limit reached ({limit})")]
    QuotaExceeded { limit: u32 },

    #[error("no candidates to draw from")]
    NoCandidates,

    #[error("roster fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("event has no group context")]
    GroupIdUnavailable,
}

impl DrawError {
    pub fn user_message(&self) -> String {
        match self {
            Self::QuotaExceeded { limit } => format!("今日抽取已达上限({limit}次)"),
            Self::NoCandidates => NO_CANDIDATES.to_string(),
            Self::Fetch(_) => FETCH_FAILED.to_string(),
            Self::GroupIdUnavailable => NO_GROUP.to_string(),
        }
    }
}

/// Errors from a [`RosterSource`](crate::plugins::spouse::roster::RosterSource).
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("api returned retcode {retcode}")]
    Api { retcode: i64 },

    #[error("unknown group {0}")]
    UnknownGroup(String),
}

impl FetchError {
    pub fn request(e: impl std::fmt::Display) -> Self {
        Self::Request(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}
