//! Snapshot-level session commands.
//!
//! Each invocation is a separate process, so these commands work on the
//! durable snapshot through the recorder rather than holding a live
//! controller.

use std::rc::Rc;

use clap::Subcommand;
use serde::Serialize;
use studylamp_core::clock::to_datetime;
use studylamp_core::session::recorder;
use studylamp_core::storage::open_backend;
use studylamp_core::{
    AnswerRecord, Clock, Config, Event, PersistedSession, PersistentStore, SessionStore,
    SystemClock,
};

type Store = SessionStore<Box<dyn PersistentStore>>;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Resume the learner's worksheet session, or begin a new one
    Start {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        level: String,
        #[arg(long)]
        worksheet: u32,
    },
    /// Record an answer to a problem
    Answer {
        #[arg(long)]
        learner: String,
        /// Problem position in the worksheet
        index: u32,
        /// The answer was correct
        #[arg(long)]
        correct: bool,
        #[arg(long, default_value = "1")]
        attempts: u32,
        /// Deepest hint shown before answering
        #[arg(long)]
        hint: Option<String>,
        /// Seconds spent on the problem
        #[arg(long, default_value = "0")]
        time: u64,
        #[arg(long, default_value = "")]
        text: String,
    },
    /// Credit focused seconds
    Focus {
        #[arg(long)]
        learner: String,
        seconds: u64,
    },
    /// Record time spent away from the worksheet, ending now
    Distract {
        #[arg(long)]
        learner: String,
        seconds: u64,
    },
    /// Print the active snapshot as JSON
    Status {
        #[arg(long)]
        learner: Option<String>,
    },
    /// Print session totals as JSON
    Summary {
        #[arg(long)]
        learner: String,
    },
    /// Drop the active snapshot
    Clear,
}

#[derive(Serialize)]
struct StartReport<'a> {
    restored: bool,
    session: &'a PersistedSession,
}

fn open_store(config: &Config) -> Result<Store, Box<dyn std::error::Error>> {
    let backend = open_backend(&config.store)?;
    tracing::debug!(backend = ?config.store.backend, "opened session store");
    Ok(SessionStore::with_config(backend, Rc::new(SystemClock), &config.store))
}

fn require(store: &Store, learner: &str) -> Result<PersistedSession, Box<dyn std::error::Error>> {
    Ok(store
        .load(Some(learner))
        .ok_or_else(|| format!("no active session for learner {learner}"))?)
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let store = open_store(&config)?;
    let now = SystemClock.now_ms();

    match action {
        SessionAction::Start {
            learner,
            level,
            worksheet,
        } => {
            let (mut session, restored) = match store.load(Some(&learner)) {
                Some(s) if s.level == level && s.worksheet == worksheet => (s, true),
                _ => {
                    let session_id = uuid::Uuid::new_v4().to_string();
                    (
                        recorder::create_new_session(&learner, &session_id, &level, worksheet, now),
                        false,
                    )
                }
            };
            store.try_save(&mut session)?;
            print_json(&StartReport {
                restored,
                session: &session,
            })?;
        }
        SessionAction::Answer {
            learner,
            index,
            correct,
            attempts,
            hint,
            time,
            text,
        } => {
            let session = require(&store, &learner)?;
            let record = AnswerRecord {
                answer_text: text,
                is_correct: correct,
                time_spent_seconds: time,
                attempt_count: attempts.max(1),
                hint_level_reached: hint,
            };
            let mut session = recorder::record_answer(&session, index, record);
            store.try_save(&mut session)?;
            print_json(&Event::AnswerRecorded {
                problem_index: index,
                is_correct: correct,
                problems_completed: session.problems_completed,
                at: to_datetime(now),
            })?;
        }
        SessionAction::Focus { learner, seconds } => {
            let session = require(&store, &learner)?;
            let mut session = recorder::update_focused_time(&session, seconds, now);
            store.try_save(&mut session)?;
            print_json(&session.timer.to_timer_state())?;
        }
        SessionAction::Distract { learner, seconds } => {
            let session = require(&store, &learner)?;
            let away_ms = i64::try_from(seconds)?.saturating_mul(1000);
            let mut session = if seconds >= config.visibility.min_distraction_seconds {
                recorder::record_distraction(&session, now.saturating_sub(away_ms), now)
            } else {
                recorder::add_away_time(&session, seconds)
            };
            store.try_save(&mut session)?;
            print_json(&session.timer.to_timer_state())?;
        }
        SessionAction::Status { learner } => {
            print_json(&store.load(learner.as_deref()))?;
        }
        SessionAction::Summary { learner } => {
            let session = require(&store, &learner)?;
            print_json(&recorder::summarize(&session))?;
        }
        SessionAction::Clear => {
            store.clear();
            println!("ok");
        }
    }
    Ok(())
}
