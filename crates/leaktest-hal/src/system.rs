//! Host-side clock implementation.

use std::thread;
use std::time::{Duration, Instant};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::traits::Clock;

/// Clock backed by `std::time::Instant` for pacing and the system wall
/// clock for record timestamps.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_until_ms(&mut self, deadline_ms: u64) {
        let now = self.now_ms();
        if deadline_ms > now {
            thread::sleep(Duration::from_millis(deadline_ms - now));
        }
    }

    fn wall_timestamp(&self) -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_and_sleeps() {
        let mut clock = SystemClock::new();
        let t0 = clock.now_ms();
        clock.sleep_ms(5);
        assert!(clock.now_ms() >= t0 + 5);
    }

    #[test]
    fn wall_timestamp_is_rfc3339() {
        let clock = SystemClock::new();
        let stamp = clock.wall_timestamp();
        assert!(stamp.contains('T'));
        assert!(stamp.len() >= 20);
    }
}
