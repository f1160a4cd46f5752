//! The durable session snapshot.
//!
//! Field names serialize to the camelCase JSON schema shared with hosts
//! (`childId`, `focusedTime`, `lastSavedAt`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ValidationError};
use crate::timer::{focus_score, TimerState};

/// One submitted answer. Keyed by problem position in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub answer_text: String,
    pub is_correct: bool,
    pub time_spent_seconds: u64,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_level_reached: Option<String>,
}

impl AnswerRecord {
    pub fn is_first_try_correct(&self) -> bool {
        self.is_correct && self.attempt_count == 1
    }

    pub fn is_correct_with_hint(&self) -> bool {
        self.is_correct && self.hint_level_reached.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistractionRecord {
    #[serde(rename = "leftAt")]
    pub left_at_epoch_ms: i64,
    #[serde(rename = "returnedAt")]
    pub returned_at_epoch_ms: i64,
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
}

impl DistractionRecord {
    /// Duration is the floored whole seconds between the two instants,
    /// never negative.
    pub fn between(left_at_epoch_ms: i64, returned_at_epoch_ms: i64) -> Self {
        let duration_ms = returned_at_epoch_ms.saturating_sub(left_at_epoch_ms).max(0);
        Self {
            left_at_epoch_ms,
            returned_at_epoch_ms,
            duration_seconds: (duration_ms / 1000) as u64,
        }
    }
}

/// Persisted timer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimer {
    pub start_time: i64,
    pub focused_time: u64,
    pub away_time: u64,
    pub last_active_time: i64,
}

impl SessionTimer {
    pub fn new(now_ms: i64) -> Self {
        Self {
            start_time: now_ms,
            focused_time: 0,
            away_time: 0,
            last_active_time: now_ms,
        }
    }

    pub fn focus_score(&self) -> u8 {
        focus_score(self.focused_time, self.away_time)
    }

    /// Counters as a stopped [`TimerState`], ready for
    /// [`TimerEngine::restore_from_state`](crate::timer::TimerEngine::restore_from_state).
    pub fn to_timer_state(&self) -> TimerState {
        TimerState::with_counters(self.focused_time, self.away_time)
    }
}

/// Everything needed to resume a worksheet after a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(rename = "childId")]
    pub learner_id: String,
    pub session_id: String,
    pub level: String,
    pub worksheet: u32,
    pub question_index: u32,
    /// Host page state, stored and returned untouched.
    #[serde(default)]
    pub worksheet_page_state: serde_json::Value,
    #[serde(default)]
    pub answers: BTreeMap<u32, AnswerRecord>,
    pub timer: SessionTimer,
    #[serde(default)]
    pub distractions: Vec<DistractionRecord>,
    #[serde(default)]
    pub problems_completed: u32,
    #[serde(default)]
    pub problems_correct: u32,
    #[serde(default)]
    pub first_try_correct: u32,
    #[serde(default)]
    pub with_hints_correct: u32,
    #[serde(default)]
    pub total_incorrect: u32,
    #[serde(rename = "createdAt")]
    pub created_at_epoch_ms: i64,
    #[serde(rename = "lastSavedAt")]
    pub last_saved_at_epoch_ms: i64,
}

impl PersistedSession {
    pub fn distraction_count(&self) -> usize {
        self.distractions.len()
    }

    pub fn focus_score(&self) -> u8 {
        self.timer.focus_score()
    }

    /// Parse a stored snapshot and check its invariants.
    ///
    /// # Errors
    /// Returns [`CoreError::Json`] for unreadable input and
    /// [`CoreError::Validation`] for an inconsistent snapshot.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let session: Self = serde_json::from_str(raw)?;
        session.validate()?;
        Ok(session)
    }

    /// Check the counter and timestamp invariants the recorder maintains.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let answered = self.answers.len() as u64;
        if u64::from(self.problems_completed) != answered {
            return Err(ValidationError::CounterMismatch {
                counter: "problemsCompleted",
                expected: answered,
                actual: u64::from(self.problems_completed),
            });
        }
        let judged = u64::from(self.problems_correct) + u64::from(self.total_incorrect);
        if judged != answered {
            return Err(ValidationError::CounterMismatch {
                counter: "problemsCorrect + totalIncorrect",
                expected: answered,
                actual: judged,
            });
        }
        for (counter, value) in [
            ("firstTryCorrect", self.first_try_correct),
            ("withHintsCorrect", self.with_hints_correct),
        ] {
            if value > self.problems_correct {
                return Err(ValidationError::CounterExceeds {
                    counter,
                    value,
                    bound: "problemsCorrect",
                    bound_value: self.problems_correct,
                });
            }
        }
        if self.last_saved_at_epoch_ms < self.created_at_epoch_ms {
            return Err(ValidationError::InvalidTimestamps {
                created: self.created_at_epoch_ms,
                last_saved: self.last_saved_at_epoch_ms,
            });
        }
        Ok(())
    }
}

/// Read-only totals handed to downstream consumers once a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub problems_completed: u32,
    pub problems_correct: u32,
    pub first_try_correct: u32,
    pub with_hints_correct: u32,
    pub total_incorrect: u32,
    pub focused_seconds: u64,
    pub away_seconds: u64,
    pub total_seconds: u64,
    pub focus_score: u8,
    pub distraction_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedSession {
        let mut answers = BTreeMap::new();
        answers.insert(
            0,
            AnswerRecord {
                answer_text: "12".into(),
                is_correct: true,
                time_spent_seconds: 14,
                attempt_count: 1,
                hint_level_reached: None,
            },
        );
        PersistedSession {
            learner_id: "child-a".into(),
            session_id: "s-1".into(),
            level: "B".into(),
            worksheet: 3,
            question_index: 1,
            worksheet_page_state: serde_json::json!({ "locked": [0] }),
            answers,
            timer: SessionTimer {
                start_time: 1_000,
                focused_time: 40,
                away_time: 5,
                last_active_time: 46_000,
            },
            distractions: vec![DistractionRecord::between(10_000, 15_400)],
            problems_completed: 1,
            problems_correct: 1,
            first_try_correct: 1,
            with_hints_correct: 0,
            total_incorrect: 0,
            created_at_epoch_ms: 1_000,
            last_saved_at_epoch_ms: 46_000,
        }
    }

    #[test]
    fn serializes_to_snapshot_schema() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["childId"], "child-a");
        assert_eq!(json["questionIndex"], 1);
        assert_eq!(json["timer"]["focusedTime"], 40);
        assert_eq!(json["timer"]["lastActiveTime"], 46_000);
        assert_eq!(json["distractions"][0]["leftAt"], 10_000);
        assert_eq!(json["distractions"][0]["duration"], 5);
        assert_eq!(json["answers"]["0"]["isCorrect"], true);
        assert!(json["answers"]["0"].get("hintLevelReached").is_none());
        assert_eq!(json["worksheetPageState"]["locked"][0], 0);
        assert_eq!(json["lastSavedAt"], 46_000);
    }

    #[test]
    fn parses_minimal_snapshot() {
        let raw = r#"{
            "childId": "a", "sessionId": "s", "level": "A", "worksheet": 1,
            "questionIndex": 0,
            "timer": { "startTime": 5, "focusedTime": 0, "awayTime": 0, "lastActiveTime": 5 },
            "createdAt": 5, "lastSavedAt": 5
        }"#;
        let session: PersistedSession = serde_json::from_str(raw).unwrap();
        assert!(session.answers.is_empty());
        assert!(session.worksheet_page_state.is_null());
        assert!(session.validate().is_ok());
    }

    #[test]
    fn distraction_duration_is_floored_and_clamped() {
        assert_eq!(DistractionRecord::between(0, 2_999).duration_seconds, 2);
        assert_eq!(DistractionRecord::between(0, 3_000).duration_seconds, 3);
        assert_eq!(DistractionRecord::between(5_000, 1_000).duration_seconds, 0);
    }

    #[test]
    fn validate_rejects_counter_drift() {
        let mut session = sample();
        session.problems_completed = 2;
        assert!(matches!(
            session.validate(),
            Err(ValidationError::CounterMismatch { counter: "problemsCompleted", .. })
        ));

        let mut session = sample();
        session.first_try_correct = 2;
        assert!(matches!(
            session.validate(),
            Err(ValidationError::CounterExceeds { counter: "firstTryCorrect", .. })
        ));

        let mut session = sample();
        session.last_saved_at_epoch_ms = 0;
        assert_eq!(
            session.validate(),
            Err(ValidationError::InvalidTimestamps { created: 1_000, last_saved: 0 })
        );
    }

    #[test]
    fn from_json_separates_parse_and_consistency_failures() {
        let raw = serde_json::to_string(&sample()).unwrap();
        assert_eq!(PersistedSession::from_json(&raw).unwrap(), sample());

        assert!(matches!(
            PersistedSession::from_json("{\"childId\": "),
            Err(CoreError::Json(_))
        ));

        let mut drifted = sample();
        drifted.total_incorrect = 1;
        let raw = serde_json::to_string(&drifted).unwrap();
        assert!(matches!(
            PersistedSession::from_json(&raw),
            Err(CoreError::Validation(ValidationError::CounterMismatch { .. }))
        ));
    }
}
