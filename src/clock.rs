use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

pub fn format_rfc3339(at: OffsetDateTime) -> String {
    // Rfc3339 only fails for offsets with seconds or years outside 0..=9999.
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn parse_rfc3339(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

#[cfg(test)]
pub use manual::ManualClock;


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{format_rfc3339, parse_rfc3339, Clock, ManualClock};

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let handle = clock.clone();
        let start = clock.now();
        handle.advance(Duration::from_millis(1500));
        assert_eq!(clock.now() - start, time::Duration::milliseconds(1500));
    }

    #[test]
    fn rfc3339_round_trips() {
        let clock = ManualClock::default();
        let text = format_rfc3339(clock.now());
        assert_eq!(text, "2026-03-02T09:00:00Z");
        assert_eq!(parse_rfc3339(&text), Some(clock.now()));
        assert_eq!(parse_rfc3339("yesterday"), None);
    }
}
