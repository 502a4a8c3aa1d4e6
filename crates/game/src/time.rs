use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock in milliseconds, the unit every document timestamp uses.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
