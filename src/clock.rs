// Wall-clock timestamps shared by samples, cycle summaries and the repository.

/// Unix milliseconds, UTC.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
