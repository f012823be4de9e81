use chrono::Duration;

/// Backoff never exceeds one day regardless of base and attempt count
pub const MAX_BACKOFF_SECS: f64 = 86_400.0;

/// Exponential backoff: `base ^ attempts` seconds, attempts counted from 1.
///
/// Pure and deterministic; callers recompute from a live config snapshot on
/// every failure. Monotonically non-decreasing in `attempts` for any base
/// >= 1 (the range the config store enforces).
pub fn backoff_delay(base: f64, attempts: u32) -> Duration {
    let secs = base.powi(attempts.min(i32::MAX as u32) as i32);
    let clamped = if secs.is_finite() {
        secs.min(MAX_BACKOFF_SECS)
    } else {
        MAX_BACKOFF_SECS
    };
    Duration::milliseconds((clamped * 1000.0) as i64)
}
