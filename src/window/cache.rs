use chrono::{DateTime, Duration, Utc};

use crate::window::DateWindow;

/// Windows touching not-yet-finalized days stay cacheable for ten minutes.
pub const SHORT_TTL: &str = "public, max-age=600";
/// Entirely historical windows are stable for good.
pub const LONG_TTL: &str = "public, max-age=31536000, immutable";

/// Upstream aggregation finalizes with at most this much lag, so the recency
/// boundary trails the wall clock by one hour.
const FINALIZATION_LAG_HOURS: i64 = 1;

/// Picks the response cache directive for a canonical window. Pure in
/// `(window.to, now)`.
pub fn cache_control_for(window: &DateWindow, now: DateTime<Utc>) -> &'static str {
    let boundary = (now - Duration::hours(FINALIZATION_LAG_HOURS)).date_naive();
    if window.to >= boundary {
        SHORT_TTL
    } else {
        LONG_TTL
    }
}

pub fn redirect_cache_control(max_age_secs: u32) -> String {
    format!("public, max-age={max_age_secs}")
}
