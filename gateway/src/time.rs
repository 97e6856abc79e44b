use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-enough wall clock in milliseconds, used for session
/// timestamps, utterance ids and metrics. Not used for pacing, which relies
/// on `std::time::Instant` instead.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
