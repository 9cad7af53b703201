// Domain Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the target list. Always fatal at startup.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot read target list {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid target on line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    #[error("Target list contains no targets")]
    Empty,
}

/// Classification shared by every session failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    Auth,
    Timeout,
    Unreachable,
    Protocol,
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionErrorKind::Auth => write!(f, "AuthError"),
            SessionErrorKind::Timeout => write!(f, "TimeoutError"),
            SessionErrorKind::Unreachable => write!(f, "UnreachableError"),
            SessionErrorKind::Protocol => write!(f, "ProtocolError"),
        }
    }
}
