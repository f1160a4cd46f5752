//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads - the caller (or [`crate::driver`]) is responsible for
//! calling `tick()` periodically.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Active <-> Paused -> Stopped
//! ```
//!
//! `Paused` has two independent causes: an explicit caller pause and the host
//! surface being hidden. The engine accrues focused time only while running
//! with neither cause present, so a visibility change never overrides what
//! the caller asked for.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(clock, &TimerConfig::default());
//! engine.start();
//! // Once per second:
//! engine.tick(); // Returns Some(Event) when whole seconds were credited
//! ```

use std::fmt;

use tracing::{debug, warn};

use super::state::{PauseReason, TimerPhase, TimerState};
use crate::clock::{to_datetime, SharedClock};
use crate::events::Event;
use crate::storage::TimerConfig;

/// Callback fired whenever a tick credits focused time.
pub type TickCallback = Box<dyn FnMut(&TimerState)>;

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread.
pub struct TimerEngine {
    clock: SharedClock,
    auto_start: bool,
    focused_seconds: u64,
    away_seconds: u64,
    /// Desired run state, owned by the caller.
    running: bool,
    user_paused: bool,
    hidden: bool,
    /// Reference point for the next credit. Present only while active.
    last_tick_epoch_ms: Option<i64>,
    on_tick: Option<TickCallback>,
}

impl fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEngine")
            .field("focused_seconds", &self.focused_seconds)
            .field("away_seconds", &self.away_seconds)
            .field("running", &self.running)
            .field("user_paused", &self.user_paused)
            .field("hidden", &self.hidden)
            .field("last_tick_epoch_ms", &self.last_tick_epoch_ms)
            .finish_non_exhaustive()
    }
}

impl TimerEngine {
    /// Create a stopped engine with zeroed counters.
    pub fn new(clock: SharedClock, config: &TimerConfig) -> Self {
        Self {
            clock,
            auto_start: config.auto_start,
            focused_seconds: 0,
            away_seconds: 0,
            running: false,
            user_paused: false,
            hidden: false,
            last_tick_epoch_ms: None,
            on_tick: None,
        }
    }

    pub fn set_on_tick(&mut self, callback: impl FnMut(&TimerState) + 'static) {
        self.on_tick = Some(Box::new(callback));
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> TimerPhase {
        if !self.running {
            TimerPhase::Stopped
        } else if self.is_accruing() {
            TimerPhase::Active
        } else {
            TimerPhase::Paused
        }
    }

    pub fn current_state(&self) -> TimerState {
        TimerState {
            focused_seconds: self.focused_seconds,
            away_seconds: self.away_seconds,
            is_paused: self.running && !self.is_accruing(),
            is_running: self.running,
        }
    }

    pub fn focus_score(&self) -> u8 {
        self.current_state().focus_score()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        let timer = self.current_state();
        Event::StateSnapshot {
            phase: self.phase(),
            timer,
            focus_score: timer.focus_score(),
            at: to_datetime(self.clock.now_ms()),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        if self.running {
            return None;
        }
        self.running = true;
        self.user_paused = false;
        self.rearm();
        debug!(focused = self.focused_seconds, hidden = self.hidden, "timer started");
        Some(Event::TimerStarted {
            focused_seconds: self.focused_seconds,
            away_seconds: self.away_seconds,
            at: self.now(),
        })
    }

    pub fn stop(&mut self) -> Option<Event> {
        if !self.running {
            return None;
        }
        self.flush_elapsed();
        self.running = false;
        self.user_paused = false;
        self.last_tick_epoch_ms = None;
        debug!(focused = self.focused_seconds, away = self.away_seconds, "timer stopped");
        Some(Event::TimerStopped {
            focused_seconds: self.focused_seconds,
            away_seconds: self.away_seconds,
            at: self.now(),
        })
    }

    /// Explicit caller pause.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.running || self.user_paused {
            return None;
        }
        self.flush_elapsed();
        self.user_paused = true;
        self.last_tick_epoch_ms = None;
        Some(Event::TimerPaused {
            reason: PauseReason::User,
            focused_seconds: self.focused_seconds,
            at: self.now(),
        })
    }

    /// Explicit caller resume.
    ///
    /// Clears the caller's pause. While the surface is hidden the engine stays
    /// paused and returns `None`; it resumes on the next visible signal.
    pub fn resume(&mut self) -> Option<Event> {
        if !self.running || !self.user_paused {
            return None;
        }
        self.user_paused = false;
        if !self.rearm() {
            return None;
        }
        Some(Event::TimerResumed {
            reason: PauseReason::User,
            focused_seconds: self.focused_seconds,
            at: self.now(),
        })
    }

    /// Reinitialize counters and run again.
    ///
    /// Lands in `Active`, or in `Paused` when configured without auto-start.
    pub fn reset(&mut self, initial: Option<TimerState>) -> Event {
        let initial = initial.unwrap_or_default();
        self.focused_seconds = initial.focused_seconds;
        self.away_seconds = initial.away_seconds;
        self.running = true;
        self.user_paused = !self.auto_start;
        self.last_tick_epoch_ms = None;
        self.rearm();
        Event::TimerReset {
            focused_seconds: self.focused_seconds,
            away_seconds: self.away_seconds,
            at: self.now(),
        }
    }

    /// Adopt a previously captured state, e.g. after a reload.
    ///
    /// `restore_from_state(current_state())` leaves the state unchanged.
    pub fn restore_from_state(&mut self, state: TimerState) {
        self.focused_seconds = state.focused_seconds;
        self.away_seconds = state.away_seconds;
        self.running = state.is_running;
        // While hidden the state cannot tell the two pauses apart, so the
        // caller's existing intent is kept.
        self.user_paused =
            state.is_running && state.is_paused && (!self.hidden || self.user_paused);
        self.last_tick_epoch_ms = None;
        self.rearm();
    }

    /// Credit whole elapsed seconds. Call periodically.
    ///
    /// Returns `Some(Event::TimerTicked)` when time was credited.
    pub fn tick(&mut self) -> Option<Event> {
        if self.flush_elapsed() == 0 {
            return None;
        }
        let state = self.current_state();
        if let Some(callback) = self.on_tick.as_mut() {
            callback(&state);
        }
        Some(Event::TimerTicked {
            focused_seconds: state.focused_seconds,
            away_seconds: state.away_seconds,
            focus_score: state.focus_score(),
            at: self.now(),
        })
    }

    // ── Visibility ───────────────────────────────────────────────────

    pub fn on_became_hidden(&mut self) -> Option<Event> {
        if self.hidden {
            return None;
        }
        let was_accruing = self.is_accruing();
        self.flush_elapsed();
        self.hidden = true;
        self.last_tick_epoch_ms = None;
        was_accruing.then(|| Event::TimerPaused {
            reason: PauseReason::Hidden,
            focused_seconds: self.focused_seconds,
            at: self.now(),
        })
    }

    /// Book `away_seconds` and resume if the caller still wants to run.
    pub fn on_became_visible(&mut self, away_seconds: u64) -> Option<Event> {
        self.away_seconds = self.away_seconds.saturating_add(away_seconds);
        if !self.hidden {
            return None;
        }
        self.hidden = false;
        if !self.rearm() {
            return None;
        }
        Some(Event::TimerResumed {
            reason: PauseReason::Hidden,
            focused_seconds: self.focused_seconds,
            at: self.now(),
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn is_accruing(&self) -> bool {
        self.running && !self.user_paused && !self.hidden
    }

    /// Reset the tick reference to now if the engine should accrue.
    /// Returns whether it does.
    fn rearm(&mut self) -> bool {
        if self.is_accruing() {
            self.last_tick_epoch_ms = Some(self.clock.now_ms());
            true
        } else {
            self.last_tick_epoch_ms = None;
            false
        }
    }

    /// Credit whole seconds since the reference and advance it by exactly
    /// that much, keeping the sub-second remainder for the next credit.
    fn flush_elapsed(&mut self) -> u64 {
        let Some(last) = self.last_tick_epoch_ms else {
            return 0;
        };
        let now = self.clock.now_ms();
        if now < last {
            warn!(
                behind_ms = last - now,
                "clock moved backwards; re-anchoring timer without credit"
            );
            self.last_tick_epoch_ms = Some(now);
            return 0;
        }
        let elapsed = ((now - last) / 1000) as u64;
        if elapsed > 0 {
            self.focused_seconds = self.focused_seconds.saturating_add(elapsed);
            self.last_tick_epoch_ms = Some(last + (elapsed as i64) * 1000);
        }
        elapsed
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        to_datetime(self.clock.now_ms())
    }
}
