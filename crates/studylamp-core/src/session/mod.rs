mod controller;
mod model;
pub mod recorder;

pub use controller::{SessionController, SessionParts, SessionRequest, VisibilityChange};
pub use model::{AnswerRecord, DistractionRecord, PersistedSession, SessionSummary, SessionTimer};
