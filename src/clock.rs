use chrono::{DateTime, NaiveDate, Utc};

/// Time source for date defaulting, cache boundaries, and observation-day
/// bucketing. Injected so date-boundary behavior is testable without
/// wall-clock flakiness.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
pub fn fixed(rfc3339: &str) -> FixedClock {
    let parsed = DateTime::parse_from_rfc3339(rfc3339)
        .expect("invalid RFC3339 timestamp in test clock")
        .with_timezone(&Utc);
    FixedClock(parsed)
}
