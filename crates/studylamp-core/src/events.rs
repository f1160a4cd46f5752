use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{PauseReason, TimerPhase, TimerState};

/// Every state change in the engine produces an Event.
/// The UI renders from them; hosts may log or forward them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        focused_seconds: u64,
        away_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        reason: PauseReason,
        focused_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        reason: PauseReason,
        focused_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        focused_seconds: u64,
        away_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        focused_seconds: u64,
        away_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerTicked {
        focused_seconds: u64,
        away_seconds: u64,
        focus_score: u8,
        at: DateTime<Utc>,
    },
    AnswerRecorded {
        problem_index: u32,
        is_correct: bool,
        problems_completed: u32,
        at: DateTime<Utc>,
    },
    /// Final tallies of a finished worksheet.
    SessionCompleted {
        session_id: String,
        problems_completed: u32,
        focus_score: u8,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        phase: TimerPhase,
        timer: TimerState,
        focus_score: u8,
        at: DateTime<Utc>,
    },
}
