// Worker and scheduler constants (no magic values)
use std::time::Duration;

/// Connect attempts per target per cycle, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay after a failed connect
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Upper bound for any single backoff delay
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Jitter spread around the nominal backoff (0.9 to 1.1)
pub const BACKOFF_JITTER_MIN: f64 = 0.9;
pub const BACKOFF_JITTER_STEPS: u32 = 21;

/// Cycle period (monthly)
pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Concurrent sessions per cycle (device connection limits are small)
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Hard limit for one cycle before outstanding workers are abandoned
pub const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

/// Time in-flight workers get to finish after a shutdown request
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Stand-in deadline for durations too large to add to the clock (~30 years)
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Bound on a best-effort session close
pub const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
