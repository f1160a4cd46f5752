//! One learning session, from first answer to completion or disposal.
//!
//! The controller owns the [`TimerEngine`], the visibility subscription and
//! the [`SessionStore`] for exactly one session. Visibility transitions
//! reach the engine synchronously, so a hidden signal always lands before
//! the next tick. Every answer, distraction and pause is written through
//! immediately; ticks save at most once per autosave interval.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model::{AnswerRecord, PersistedSession, SessionSummary};
use super::recorder;
use crate::clock::{to_datetime, SharedClock};
use crate::events::Event;
use crate::storage::{Config, PersistentStore, SessionStore};
use crate::timer::{TimerEngine, TimerPhase, TimerState};
use crate::visibility::{
    self, VisibilityHandle, VisibilityObserver, VisibilitySource, VisibilityState,
};

/// Which worksheet a learner is opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub learner_id: String,
    pub level: String,
    pub worksheet: u32,
}

/// Capabilities a session runs against.
pub struct SessionParts<S> {
    pub clock: SharedClock,
    pub visibility: Rc<dyn VisibilitySource>,
    pub backend: S,
    pub config: Config,
}

/// Reported to the `on_visibility_change` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisibilityChange {
    Hidden,
    Visible { away_seconds: u64, is_distraction: bool },
}

type TickHook = Box<dyn FnMut(&TimerState)>;
type VisibilityHook = Box<dyn FnMut(VisibilityChange)>;

struct Inner<S> {
    clock: SharedClock,
    store: SessionStore<S>,
    engine: RefCell<TimerEngine>,
    session: RefCell<PersistedSession>,
    monitor: RefCell<Option<VisibilityHandle>>,
    autosave_interval_ms: i64,
    on_tick: RefCell<Option<TickHook>>,
    on_visibility_change: RefCell<Option<VisibilityHook>>,
    finished: Cell<bool>,
}

impl<S: PersistentStore> Inner<S> {
    /// Bring the snapshot's focused time up to the engine's.
    fn fold_focused(&self) {
        let focused = self.engine.borrow().current_state().focused_seconds;
        let mut session = self.session.borrow_mut();
        let delta = focused.saturating_sub(session.timer.focused_time);
        if delta > 0 {
            *session = recorder::update_focused_time(&session, delta, self.clock.now_ms());
        }
    }

    fn persist(&self) {
        let mut session = self.session.borrow_mut();
        self.store.save(&mut session);
    }

    fn autosave(&self) {
        let due = {
            let session = self.session.borrow();
            let elapsed = self.clock.now_ms().saturating_sub(session.last_saved_at_epoch_ms);
            elapsed >= self.autosave_interval_ms
        };
        if due {
            self.persist();
        }
    }

    fn handle_hidden(&self) {
        self.engine.borrow_mut().on_became_hidden();
        self.fold_focused();
        self.persist();
        self.notify(VisibilityChange::Hidden);
    }

    fn handle_visible(&self, away_seconds: u64) {
        self.engine.borrow_mut().on_became_visible(away_seconds);
        let interval = self
            .monitor
            .borrow()
            .as_ref()
            .and_then(VisibilityHandle::last_away_interval);
        let is_distraction = interval.is_some_and(|i| i.is_distraction);
        {
            let mut session = self.session.borrow_mut();
            *session = match interval {
                Some(i) if i.is_distraction => recorder::record_distraction(
                    &session,
                    i.left_at_epoch_ms,
                    i.returned_at_epoch_ms,
                ),
                _ => recorder::add_away_time(&session, away_seconds),
            };
        }
        self.fold_focused();
        self.persist();
        self.notify(VisibilityChange::Visible {
            away_seconds,
            is_distraction,
        });
    }

    fn notify(&self, change: VisibilityChange) {
        if let Some(hook) = self.on_visibility_change.borrow_mut().as_mut() {
            hook(change);
        }
    }

    /// Stop accruing and release the subscription.
    fn halt(&self) {
        self.engine.borrow_mut().stop();
        self.fold_focused();
        self.monitor.borrow_mut().take();
        self.finished.set(true);
    }
}

/// Owns one session's engine, subscription and snapshot.
pub struct SessionController<S: PersistentStore + 'static> {
    inner: Rc<Inner<S>>,
    restored: bool,
}

impl<S: PersistentStore + 'static> SessionController<S> {
    /// Resume the learner's stored session for this worksheet, or start a
    /// new one.
    ///
    /// A stored session for a different level or worksheet is replaced.
    pub fn open(request: SessionRequest, parts: SessionParts<S>) -> Self {
        let SessionParts {
            clock,
            visibility: source,
            backend,
            config,
        } = parts;
        let store = SessionStore::with_config(backend, Rc::clone(&clock), &config.store);

        let (session, restored) = match store.load(Some(&request.learner_id)) {
            Some(session)
                if session.level == request.level && session.worksheet == request.worksheet =>
            {
                info!(session_id = %session.session_id, "resuming stored session");
                (session, true)
            }
            other => {
                if let Some(stale) = other {
                    debug!(
                        session_id = %stale.session_id,
                        "stored session is for another worksheet; starting over"
                    );
                }
                let session_id = uuid::Uuid::new_v4().to_string();
                let session = recorder::create_new_session(
                    &request.learner_id,
                    &session_id,
                    &request.level,
                    request.worksheet,
                    clock.now_ms(),
                );
                (session, false)
            }
        };

        let mut engine = TimerEngine::new(Rc::clone(&clock), &config.timer);
        engine.restore_from_state(session.timer.to_timer_state());
        engine.start();

        let inner = Rc::new(Inner {
            clock: Rc::clone(&clock),
            store,
            engine: RefCell::new(engine),
            session: RefCell::new(session),
            monitor: RefCell::new(None),
            autosave_interval_ms: config.store.autosave_interval_ms(),
            on_tick: RefCell::new(None),
            on_visibility_change: RefCell::new(None),
            finished: Cell::new(false),
        });

        let on_hidden = Rc::downgrade(&inner);
        let on_visible = Rc::downgrade(&inner);
        let handle = visibility::observe(
            source,
            clock,
            &config.visibility,
            VisibilityObserver::new(
                move || {
                    if let Some(inner) = on_hidden.upgrade() {
                        inner.handle_hidden();
                    }
                },
                move |away_seconds| {
                    if let Some(inner) = on_visible.upgrade() {
                        inner.handle_visible(away_seconds);
                    }
                },
            ),
        );
        let starts_hidden = handle.is_subscribed() && !handle.current_state().is_foreground;
        *inner.monitor.borrow_mut() = Some(handle);
        if starts_hidden {
            inner.engine.borrow_mut().on_became_hidden();
        }
        inner.persist();

        Self { inner, restored }
    }

    pub fn was_restored(&self) -> bool {
        self.restored
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> PersistedSession {
        self.inner.session.borrow().clone()
    }

    pub fn summary(&self) -> SessionSummary {
        recorder::summarize(&self.inner.session.borrow())
    }

    pub fn timer_state(&self) -> TimerState {
        self.inner.engine.borrow().current_state()
    }

    pub fn phase(&self) -> TimerPhase {
        self.inner.engine.borrow().phase()
    }

    pub fn visibility_state(&self) -> VisibilityState {
        self.inner
            .monitor
            .borrow()
            .as_ref()
            .map(VisibilityHandle::current_state)
            .unwrap_or_default()
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.inner.store
    }

    pub fn snapshot(&self) -> Event {
        self.inner.engine.borrow().snapshot()
    }

    // ── Hooks ────────────────────────────────────────────────────────

    pub fn set_on_tick(&self, hook: impl FnMut(&TimerState) + 'static) {
        *self.inner.on_tick.borrow_mut() = Some(Box::new(hook));
    }

    pub fn set_on_visibility_change(&self, hook: impl FnMut(VisibilityChange) + 'static) {
        *self.inner.on_visibility_change.borrow_mut() = Some(Box::new(hook));
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Credit elapsed focused time. Call once per tick period.
    pub fn tick(&self) -> Option<Event> {
        let event = self.inner.engine.borrow_mut().tick()?;
        self.inner.fold_focused();
        let state = self.timer_state();
        if let Some(hook) = self.inner.on_tick.borrow_mut().as_mut() {
            hook(&state);
        }
        self.inner.autosave();
        Some(event)
    }

    pub fn submit_answer(&self, problem_index: u32, record: AnswerRecord) -> Event {
        self.inner.fold_focused();
        let is_correct = record.is_correct;
        let problems_completed = {
            let mut session = self.inner.session.borrow_mut();
            *session = recorder::record_answer(&session, problem_index, record);
            session.problems_completed
        };
        self.inner.persist();
        Event::AnswerRecorded {
            problem_index,
            is_correct,
            problems_completed,
            at: to_datetime(self.inner.clock.now_ms()),
        }
    }

    pub fn update_page_state(&self, page_state: serde_json::Value) {
        {
            let mut session = self.inner.session.borrow_mut();
            *session = recorder::with_page_state(&session, page_state);
        }
        self.inner.persist();
    }

    pub fn pause(&self) -> Option<Event> {
        let event = self.inner.engine.borrow_mut().pause()?;
        self.inner.fold_focused();
        self.inner.persist();
        Some(event)
    }

    pub fn resume(&self) -> Option<Event> {
        let event = self.inner.engine.borrow_mut().resume();
        if event.is_some() {
            self.inner.persist();
        }
        event
    }

    /// Reinitialize the timer counters, in the engine and the snapshot.
    pub fn reset_timer(&self, initial: Option<TimerState>) -> Event {
        let event = self.inner.engine.borrow_mut().reset(initial);
        self.sync_timer_counters();
        event
    }

    /// Adopt `state` as the timer's state, in the engine and the snapshot.
    pub fn restore_timer(&self, state: TimerState) {
        self.inner.engine.borrow_mut().restore_from_state(state);
        self.sync_timer_counters();
    }

    /// Write the snapshot now.
    pub fn save(&self) {
        self.inner.fold_focused();
        self.inner.persist();
    }

    /// Finish the worksheet: stop, clear the durable slot and hand back the
    /// final snapshot for downstream consumers.
    pub fn complete(self) -> (PersistedSession, Event) {
        self.inner.halt();
        self.inner.store.clear();
        let session = self.session();
        let focus_score = session.focus_score();
        info!(
            session_id = %session.session_id,
            problems_completed = session.problems_completed,
            focus_score,
            "session completed"
        );
        let event = Event::SessionCompleted {
            session_id: session.session_id.clone(),
            problems_completed: session.problems_completed,
            focus_score,
            at: to_datetime(self.inner.clock.now_ms()),
        };
        (session, event)
    }

    /// Stop ticking, unsubscribe and leave the latest snapshot written.
    pub fn dispose(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        if self.inner.finished.get() {
            return;
        }
        self.inner.halt();
        self.inner.persist();
        debug!("session disposed");
    }

    fn sync_timer_counters(&self) {
        let state = self.timer_state();
        {
            let mut session = self.inner.session.borrow_mut();
            session.timer.focused_time = state.focused_seconds;
            session.timer.away_time = state.away_seconds;
            let now = self.inner.clock.now_ms();
            session.timer.last_active_time = session.timer.last_active_time.max(now);
        }
        self.inner.persist();
    }
}

impl<S: PersistentStore + 'static> Drop for SessionController<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::visibility::ManualVisibility;

    struct Rig {
        clock: ManualClock,
        source: ManualVisibility,
        backend: Rc<MemoryStore>,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                clock: ManualClock::new(1_700_000_000_000),
                source: ManualVisibility::new(true),
                backend: Rc::new(MemoryStore::new()),
            }
        }

        fn open(&self, learner: &str) -> SessionController<Rc<MemoryStore>> {
            self.open_with(learner, Config::default())
        }

        fn open_with(&self, learner: &str, config: Config) -> SessionController<Rc<MemoryStore>> {
            SessionController::open(
                SessionRequest {
                    learner_id: learner.into(),
                    level: "B".into(),
                    worksheet: 2,
                },
                SessionParts {
                    clock: Rc::new(self.clock.clone()),
                    visibility: Rc::new(self.source.clone()),
                    backend: Rc::clone(&self.backend),
                    config,
                },
            )
        }

        fn focus_for(&self, controller: &SessionController<Rc<MemoryStore>>, secs: i64) {
            for _ in 0..secs {
                self.clock.advance_secs(1);
                controller.tick();
            }
        }
    }

    fn correct() -> AnswerRecord {
        AnswerRecord {
            answer_text: "7".into(),
            is_correct: true,
            time_spent_seconds: 5,
            attempt_count: 1,
            hint_level_reached: None,
        }
    }

    #[test]
    fn open_starts_fresh_and_persists() {
        let rig = Rig::new();
        let controller = rig.open("a");
        assert!(!controller.was_restored());
        assert_eq!(controller.phase(), TimerPhase::Active);
        assert!(controller.store().has_active("a"));
        assert_eq!(rig.source.listener_count(), 1);
    }

    #[test]
    fn ticks_fold_into_snapshot() {
        let rig = Rig::new();
        let controller = rig.open("a");
        let ticks = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&ticks);
        controller.set_on_tick(move |_| *counter.borrow_mut() += 1);

        rig.focus_for(&controller, 15);
        assert_eq!(*ticks.borrow(), 15);
        assert_eq!(controller.session().timer.focused_time, 15);
        // Autosave every 10s keeps the durable copy close behind.
        let stored = controller.store().load(Some("a")).unwrap();
        assert_eq!(stored.timer.focused_time, 10);
    }

    #[test]
    fn hidden_surface_pauses_and_records_distraction() {
        let rig = Rig::new();
        let controller = rig.open("a");
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        controller.set_on_visibility_change(move |c| sink.borrow_mut().push(c));

        rig.focus_for(&controller, 5);
        rig.source.set_foreground(false);
        assert_eq!(controller.phase(), TimerPhase::Paused);
        rig.clock.advance_secs(8);
        assert!(controller.tick().is_none());
        rig.source.set_foreground(true);

        let session = controller.session();
        assert_eq!(session.timer.focused_time, 5);
        assert_eq!(session.timer.away_time, 8);
        assert_eq!(session.distractions.len(), 1);
        assert_eq!(session.distractions[0].duration_seconds, 8);
        assert_eq!(controller.timer_state().away_seconds, 8);
        assert_eq!(
            *changes.borrow(),
            vec![
                VisibilityChange::Hidden,
                VisibilityChange::Visible { away_seconds: 8, is_distraction: true },
            ]
        );
        // Written through immediately.
        let stored = controller.store().load(Some("a")).unwrap();
        assert_eq!(stored.distractions.len(), 1);
    }

    #[test]
    fn flicker_books_away_time_without_distraction() {
        let rig = Rig::new();
        let controller = rig.open("a");
        rig.source.set_foreground(false);
        rig.clock.advance_ms(2_900);
        rig.source.set_foreground(true);

        let session = controller.session();
        assert_eq!(session.timer.away_time, 2);
        assert!(session.distractions.is_empty());
        assert_eq!(controller.visibility_state().away_seconds_accumulated, 2);
    }

    #[test]
    fn user_pause_survives_visibility_cycle() {
        let rig = Rig::new();
        let controller = rig.open("a");
        assert!(controller.pause().is_some());
        rig.source.set_foreground(false);
        rig.clock.advance_secs(4);
        rig.source.set_foreground(true);
        assert_eq!(controller.phase(), TimerPhase::Paused);

        rig.clock.advance_secs(4);
        controller.tick();
        assert_eq!(controller.timer_state().focused_seconds, 0);
        controller.resume();
        rig.focus_for(&controller, 2);
        assert_eq!(controller.timer_state().focused_seconds, 2);
    }

    #[test]
    fn opening_while_hidden_starts_paused() {
        let rig = Rig::new();
        rig.source.set_foreground(false);
        let controller = rig.open("a");
        assert_eq!(controller.phase(), TimerPhase::Paused);
        rig.clock.advance_secs(30);
        rig.source.set_foreground(true);
        assert_eq!(controller.phase(), TimerPhase::Active);
        assert_eq!(controller.timer_state().away_seconds, 0);
    }

    #[test]
    fn reopen_restores_matching_worksheet() {
        let rig = Rig::new();
        let first = rig.open("a");
        rig.focus_for(&first, 20);
        first.submit_answer(0, correct());
        let session_id = first.session().session_id;
        first.dispose();
        assert_eq!(rig.source.listener_count(), 0);

        rig.clock.advance_secs(600);
        let second = rig.open("a");
        assert!(second.was_restored());
        assert_eq!(second.session().session_id, session_id);
        assert_eq!(second.timer_state().focused_seconds, 20);
        assert_eq!(second.session().problems_completed, 1);
        // Time spent closed is not credited.
        rig.focus_for(&second, 1);
        assert_eq!(second.timer_state().focused_seconds, 21);
    }

    #[test]
    fn other_worksheet_starts_over() {
        let rig = Rig::new();
        let first = rig.open("a");
        first.submit_answer(0, correct());
        drop(first);

        let second = SessionController::open(
            SessionRequest {
                learner_id: "a".into(),
                level: "B".into(),
                worksheet: 3,
            },
            SessionParts {
                clock: Rc::new(rig.clock.clone()),
                visibility: Rc::new(rig.source.clone()),
                backend: Rc::clone(&rig.backend),
                config: Config::default(),
            },
        );
        assert!(!second.was_restored());
        assert_eq!(second.session().problems_completed, 0);
    }

    #[test]
    fn drop_writes_final_snapshot() {
        let rig = Rig::new();
        let controller = rig.open("a");
        rig.focus_for(&controller, 3);
        drop(controller);
        assert_eq!(rig.source.listener_count(), 0);

        let store = SessionStore::new(Rc::clone(&rig.backend), Rc::new(rig.clock.clone()));
        assert_eq!(store.load(Some("a")).unwrap().timer.focused_time, 3);
    }

    #[test]
    fn complete_clears_slot() {
        let rig = Rig::new();
        let controller = rig.open("a");
        controller.submit_answer(0, correct());
        rig.focus_for(&controller, 4);
        let (finished, event) = controller.complete();

        assert_eq!(finished.problems_completed, 1);
        assert_eq!(finished.timer.focused_time, 4);
        match event {
            Event::SessionCompleted {
                session_id,
                problems_completed,
                focus_score,
                ..
            } => {
                assert_eq!(session_id, finished.session_id);
                assert_eq!(problems_completed, 1);
                assert_eq!(focus_score, 100);
            }
            other => panic!("Expected SessionCompleted, got {other:?}"),
        }
        assert!(rig.backend.is_empty());
        assert_eq!(rig.source.listener_count(), 0);
    }

    #[test]
    fn restore_while_hidden_keeps_caller_pause() {
        let rig = Rig::new();
        let controller = rig.open("a");
        rig.focus_for(&controller, 3);
        controller.pause();
        rig.source.set_foreground(false);

        controller.restore_timer(controller.timer_state());
        rig.clock.advance_secs(4);
        rig.source.set_foreground(true);
        rig.focus_for(&controller, 5);

        assert_eq!(controller.phase(), TimerPhase::Paused);
        assert_eq!(controller.timer_state().focused_seconds, 3);
        assert_eq!(controller.session().timer.focused_time, 3);
    }

    #[test]
    fn visibility_hook_may_report_visibility() {
        let rig = Rig::new();
        let controller = rig.open("a");
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        let source = rig.source.clone();
        controller.set_on_visibility_change(move |change| {
            sink.borrow_mut().push(change);
            if change == VisibilityChange::Hidden {
                source.set_foreground(true);
            }
        });

        rig.source.set_foreground(false);
        assert_eq!(
            *changes.borrow(),
            vec![
                VisibilityChange::Hidden,
                VisibilityChange::Visible { away_seconds: 0, is_distraction: false },
            ]
        );
        assert_eq!(controller.phase(), TimerPhase::Active);
    }

    #[test]
    fn restore_and_reset_keep_snapshot_in_step() {
        let rig = Rig::new();
        let controller = rig.open("a");
        rig.focus_for(&controller, 6);

        controller.restore_timer(TimerState {
            focused_seconds: 50,
            away_seconds: 5,
            is_paused: false,
            is_running: true,
        });
        assert_eq!(controller.session().timer.focused_time, 50);
        assert_eq!(controller.session().timer.away_time, 5);

        controller.reset_timer(None);
        assert_eq!(controller.session().timer.focused_time, 0);
        rig.focus_for(&controller, 2);
        assert_eq!(controller.session().timer.focused_time, 2);
    }

    #[test]
    fn disabled_visibility_leaves_timer_alone() {
        let rig = Rig::new();
        let mut config = Config::default();
        config.visibility.enabled = false;
        let controller = rig.open_with("a", config);
        assert_eq!(rig.source.listener_count(), 0);

        rig.source.set_foreground(false);
        rig.focus_for(&controller, 3);
        assert_eq!(controller.timer_state().focused_seconds, 3);
    }

    #[test]
    fn page_state_is_persisted() {
        let rig = Rig::new();
        let controller = rig.open("a");
        controller.update_page_state(serde_json::json!({ "locked": [1, 2] }));
        let stored = controller.store().load(Some("a")).unwrap();
        assert_eq!(stored.worksheet_page_state["locked"][1], 2);
    }
}
