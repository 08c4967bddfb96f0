use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("no user is signed in; a session needs a non-empty user name")]
    MissingUser,
    #[error("unknown level id: {0}")]
    UnknownLevel(String),
    #[error("invalid level {level}: {reason}")]
    InvalidLevel { level: String, reason: String },
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed json at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TrainerError {
    pub fn invalid(level: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLevel {
            level: level.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = TrainerError> = std::result::Result<T, E>;
