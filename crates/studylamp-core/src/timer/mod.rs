mod engine;
mod state;

pub use engine::{TickCallback, TimerEngine};
pub use state::{focus_score, PauseReason, TimerPhase, TimerState};
