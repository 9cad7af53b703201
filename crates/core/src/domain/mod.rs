// Domain Layer - Pure backup entities

pub mod credential;
pub mod cycle;
pub mod error;
pub mod target;

// Re-exports
pub use credential::{Credential, Secret};
pub use cycle::{
    render_artifact_text, AttemptRecord, BackupAttempt, BackupOutcome, Cycle, CycleId, CycleReport,
    FailureKind, RecordResult,
};
pub use error::{LoadError, SessionErrorKind};
pub use target::{DeviceType, Target, TargetId};
