// Port Layer - Interfaces for external collaborators

pub mod artifact_store;
pub mod session_client;
pub mod time_provider;

// Re-exports
pub use artifact_store::{ArtifactError, ArtifactStore};
pub use session_client::{Session, SessionClient, SessionError};
pub use time_provider::TimeProvider;
