// Worker constants (no magic values)

use std::time::Duration;

/// Poll interval when no task is due (500ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(500);

/// Sleep duration after a worker error before retrying (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
