use std::time::{Duration, SystemTime};

/// How long before the hard invocation deadline the watchdog fires.
pub const WATCHDOG_MARGIN: Duration = Duration::from_millis(500);

pub const TIMEOUT_REASON: &str = "Execution timed out";

/// Delay after which the watchdog should fire, given the remaining budget.
pub fn watchdog_delay(remaining: Duration) -> Duration {
    remaining.saturating_sub(WATCHDOG_MARGIN)
}

/// Remaining budget until `deadline`; zero when the deadline already passed.
pub fn remaining_until(deadline: SystemTime, now: SystemTime) -> Duration {
    deadline.duration_since(now).unwrap_or(Duration::ZERO)
}
