//! Pure folds of learner activity into a [`PersistedSession`].
//!
//! Every function takes the current snapshot by reference and returns the
//! next one; none of them touches a clock or a store. Timestamps are passed
//! in by the caller.

use std::collections::BTreeMap;

use super::model::{AnswerRecord, DistractionRecord, PersistedSession, SessionSummary, SessionTimer};

/// A fresh snapshot for a learner starting a worksheet.
pub fn create_new_session(
    learner_id: &str,
    session_id: &str,
    level: &str,
    worksheet: u32,
    now_ms: i64,
) -> PersistedSession {
    PersistedSession {
        learner_id: learner_id.to_string(),
        session_id: session_id.to_string(),
        level: level.to_string(),
        worksheet,
        question_index: 0,
        worksheet_page_state: serde_json::Value::Null,
        answers: BTreeMap::new(),
        timer: SessionTimer::new(now_ms),
        distractions: Vec::new(),
        problems_completed: 0,
        problems_correct: 0,
        first_try_correct: 0,
        with_hints_correct: 0,
        total_incorrect: 0,
        created_at_epoch_ms: now_ms,
        last_saved_at_epoch_ms: now_ms,
    }
}

/// Store `record` at `problem_index` and update the tallies.
///
/// Answering an index a second time replaces the earlier record; its
/// contribution to the tallies is withdrawn first, so `problems_completed`
/// always equals the number of answered problems.
pub fn record_answer(
    session: &PersistedSession,
    problem_index: u32,
    record: AnswerRecord,
) -> PersistedSession {
    let mut next = session.clone();
    if let Some(previous) = next.answers.get(&problem_index) {
        let tally = Tally::of(previous);
        next.problems_completed = next.problems_completed.saturating_sub(1);
        next.problems_correct = next.problems_correct.saturating_sub(tally.correct);
        next.first_try_correct = next.first_try_correct.saturating_sub(tally.first_try);
        next.with_hints_correct = next.with_hints_correct.saturating_sub(tally.with_hint);
        next.total_incorrect = next.total_incorrect.saturating_sub(tally.incorrect);
    }

    let tally = Tally::of(&record);
    next.problems_completed += 1;
    next.problems_correct += tally.correct;
    next.first_try_correct += tally.first_try;
    next.with_hints_correct += tally.with_hint;
    next.total_incorrect += tally.incorrect;

    next.answers.insert(problem_index, record);
    next.question_index = problem_index.saturating_add(1);
    next
}

/// Append a distraction and book its duration as away time.
pub fn record_distraction(
    session: &PersistedSession,
    left_at_epoch_ms: i64,
    returned_at_epoch_ms: i64,
) -> PersistedSession {
    let record = DistractionRecord::between(left_at_epoch_ms, returned_at_epoch_ms);
    let mut next = session.clone();
    next.timer.away_time = next.timer.away_time.saturating_add(record.duration_seconds);
    next.distractions.push(record);
    next
}

pub fn update_focused_time(
    session: &PersistedSession,
    additional_seconds: u64,
    now_ms: i64,
) -> PersistedSession {
    let mut next = session.clone();
    next.timer.focused_time = next.timer.focused_time.saturating_add(additional_seconds);
    next.timer.last_active_time = next.timer.last_active_time.max(now_ms);
    next
}

/// Book away time that did not reach the distraction threshold.
pub fn add_away_time(session: &PersistedSession, seconds: u64) -> PersistedSession {
    let mut next = session.clone();
    next.timer.away_time = next.timer.away_time.saturating_add(seconds);
    next
}

/// Replace the host's opaque page state.
pub fn with_page_state(
    session: &PersistedSession,
    page_state: serde_json::Value,
) -> PersistedSession {
    let mut next = session.clone();
    next.worksheet_page_state = page_state;
    next
}

pub fn summarize(session: &PersistedSession) -> SessionSummary {
    let timer = session.timer;
    SessionSummary {
        problems_completed: session.problems_completed,
        problems_correct: session.problems_correct,
        first_try_correct: session.first_try_correct,
        with_hints_correct: session.with_hints_correct,
        total_incorrect: session.total_incorrect,
        focused_seconds: timer.focused_time,
        away_seconds: timer.away_time,
        total_seconds: timer.focused_time.saturating_add(timer.away_time),
        focus_score: timer.focus_score(),
        distraction_count: u32::try_from(session.distractions.len()).unwrap_or(u32::MAX),
    }
}

struct Tally {
    correct: u32,
    first_try: u32,
    with_hint: u32,
    incorrect: u32,
}

impl Tally {
    fn of(record: &AnswerRecord) -> Self {
        Self {
            correct: u32::from(record.is_correct),
            first_try: u32::from(record.is_first_try_correct()),
            with_hint: u32::from(record.is_correct_with_hint()),
            incorrect: u32::from(!record.is_correct),
        }
    }
}
