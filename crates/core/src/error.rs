// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Target list error: {0}")]
    Load(#[from] crate::domain::LoadError),

    #[error("Session error: {0}")]
    Session(#[from] crate::port::SessionError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] crate::port::ArtifactError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
