// Application Layer - Use Cases and Business Logic

pub mod result_sink;
pub mod retry;
pub mod scheduler;
pub mod targets;
pub mod worker;

// Re-exports
pub use result_sink::ResultSink;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{CycleScheduler, SchedulerConfig, SchedulerState};
pub use targets::{load_targets, parse_targets};
pub use worker::{shutdown_channel, BackupWorker, ShutdownSender, ShutdownToken, WorkerSignals};
