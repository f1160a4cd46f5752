//! Time sources for the engine.
//!
//! Every component reads time through the [`Clock`] trait so that hosts can
//! pick a source and tests can drive time by hand. All values are epoch
//! milliseconds, the unit persisted in snapshots.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Utc};

/// A source of epoch-millisecond timestamps.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// Clock handle shared by every component of one session.
pub type SharedClock = Rc<dyn Clock>;

/// Wall-clock time.
///
/// This is the fallback for hosts without a monotonic source. A system clock
/// change during a session shifts every delta measured across it; the engine
/// clamps negative deltas to zero but cannot recover time lost or gained by a
/// forward jump.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Epoch time that never runs backwards.
///
/// Anchors the wall clock once at construction and advances with
/// [`Instant`], so system clock changes during the process lifetime do not
/// affect elapsed-time accounting.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_epoch_ms: i64,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_epoch_ms: Utc::now().timestamp_millis(),
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor_epoch_ms.saturating_add(elapsed)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so one handle can be given to the engine and
/// another kept by the test driving it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set_ms(&self, ms: i64) {
        self.now.set(ms);
    }

    /// Moves time by `ms`, which may be negative to model a clock jump.
    pub fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs.saturating_mul(1000));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

/// Converts an epoch-millisecond timestamp for event payloads.
pub fn to_datetime(epoch_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_ms).unwrap_or_default()
}
