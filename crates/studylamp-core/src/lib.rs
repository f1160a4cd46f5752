//! # Studylamp Core Library
//!
//! Session continuity for timed worksheets: a visibility-aware focus timer,
//! distraction tracking and a durable snapshot that lets a learner resume
//! after a reload.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine that requires the caller
//!   to periodically invoke `tick()` for progress updates
//! - **Visibility**: Turns foreground/background signals into away intervals
//!   and distractions
//! - **Session**: Pure recording functions over the persisted snapshot, and a
//!   controller wiring timer, visibility and storage together
//! - **Storage**: Key-value slot backends (SQLite, files, memory) and TOML
//!   configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Focus/away counter state machine
//! - [`SessionController`]: One session from open to completion
//! - [`SessionStore`]: Save, load and evict the active snapshot
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod driver;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod timer;
pub mod visibility;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock, SystemClock};
pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::Event;
pub use session::{
    AnswerRecord, DistractionRecord, PersistedSession, SessionController, SessionParts,
    SessionRequest, SessionSummary, SessionTimer, VisibilityChange,
};
pub use storage::{Config, MemoryStore, PersistentStore, SessionStore};
pub use timer::{TimerEngine, TimerPhase, TimerState};
pub use visibility::{ManualVisibility, VisibilitySource, VisibilityState};
