#![forbid(unsafe_code)]

use std::cell::Cell;
use time::OffsetDateTime;

pub fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    let ms = nanos / 1_000_000i128;
    if ms <= 0 {
        0
    } else if ms >= i64::MAX as i128 {
        i64::MAX
    } else {
        ms as i64
    }
}

/// Hands out strictly increasing `createdAt` values so two writes in the same
/// millisecond still sort deterministically.
#[derive(Debug)]
pub struct MonotonicClock {
    last: Cell<i64>,
    wall: bool,
}

impl MonotonicClock {
    pub fn system() -> Self {
        Self {
            last: Cell::new(i64::MIN),
            wall: true,
        }
    }

    /// Ignores wall time: the first tick is `start_ms`, then +1 per tick.
    pub fn starting_at(start_ms: i64) -> Self {
        Self {
            last: Cell::new(start_ms.saturating_sub(1)),
            wall: false,
        }
    }

    pub fn tick(&self) -> i64 {
        let floor = self.last.get().saturating_add(1);
        let next = if self.wall { now_ms().max(floor) } else { floor };
        self.last.set(next);
        next
    }

    /// Never hand out a value at or below `ts_ms` (used after reopening a store).
    pub fn observe(&self, ts_ms: i64) {
        if ts_ms > self.last.get() {
            self.last.set(ts_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_strictly_increasing() {
        let clock = MonotonicClock::system();
        let a = clock.tick();
        let b = clock.tick();
        let c = clock.tick();
        assert!(a < b && b < c);

        let manual = MonotonicClock::starting_at(1_000);
        assert_eq!(manual.tick(), 1_000);
        manual.observe(5_000);
        assert_eq!(manual.tick(), 5_001);
    }
}
