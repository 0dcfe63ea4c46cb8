use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current wall-clock time in epoch milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Time left until an epoch-millisecond deadline, zero if already past
pub fn until(deadline: u64, now: u64) -> Duration {
    Duration::from_millis(deadline.saturating_sub(now))
}
