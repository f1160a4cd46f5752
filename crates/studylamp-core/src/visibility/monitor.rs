//! Turns raw foreground/background transitions into away intervals.
//!
//! Every away interval adds its floored seconds to the away total. Only
//! intervals at least `min_distraction_seconds` long count as distractions;
//! shorter flickers still cost focus score but do not show up in the
//! distraction count.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::source::{SubscriptionId, VisibilitySource};
use crate::clock::SharedClock;
use crate::storage::VisibilityConfig;

/// The most recent meaningful interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDistraction {
    pub duration_seconds: u64,
    pub returned_at_epoch_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityState {
    pub is_foreground: bool,
    pub away_seconds_accumulated: u64,
    pub distraction_count: u32,
    pub last_distraction: Option<LastDistraction>,
}

/// A completed background interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwayInterval {
    pub left_at_epoch_ms: i64,
    pub returned_at_epoch_ms: i64,
    pub away_seconds: u64,
    pub is_distraction: bool,
}

/// Callbacks invoked on transitions.
pub struct VisibilityObserver {
    pub on_became_hidden: Box<dyn FnMut()>,
    pub on_became_visible: Box<dyn FnMut(u64)>,
}

impl VisibilityObserver {
    pub fn new(
        on_became_hidden: impl FnMut() + 'static,
        on_became_visible: impl FnMut(u64) + 'static,
    ) -> Self {
        Self {
            on_became_hidden: Box::new(on_became_hidden),
            on_became_visible: Box::new(on_became_visible),
        }
    }

    /// An observer that only tracks state.
    pub fn silent() -> Self {
        Self::new(|| {}, |_| {})
    }
}

struct Tracker {
    state: VisibilityState,
    left_at_ms: Option<i64>,
    last_interval: Option<AwayInterval>,
}

struct Shared {
    clock: SharedClock,
    min_distraction_ms: i64,
    tracker: RefCell<Tracker>,
    observer: RefCell<VisibilityObserver>,
}

enum Transition {
    Hidden,
    Visible(u64),
}

impl Shared {
    fn handle(&self, foreground: bool) {
        let transition = {
            let mut tracker = self.tracker.borrow_mut();
            let now = self.clock.now_ms();
            if !foreground {
                if !tracker.state.is_foreground {
                    return;
                }
                tracker.state.is_foreground = false;
                tracker.left_at_ms = Some(now);
                Transition::Hidden
            } else {
                if tracker.state.is_foreground {
                    return;
                }
                tracker.state.is_foreground = true;
                match tracker.left_at_ms.take() {
                    Some(left_at) => {
                        let away_ms = (now - left_at).max(0);
                        let away_seconds = (away_ms / 1000) as u64;
                        let is_distraction = away_ms >= self.min_distraction_ms;
                        let state = &mut tracker.state;
                        state.away_seconds_accumulated =
                            state.away_seconds_accumulated.saturating_add(away_seconds);
                        if is_distraction {
                            state.distraction_count = state.distraction_count.saturating_add(1);
                            state.last_distraction = Some(LastDistraction {
                                duration_seconds: away_seconds,
                                returned_at_epoch_ms: now,
                            });
                        }
                        tracker.last_interval = Some(AwayInterval {
                            left_at_epoch_ms: left_at,
                            returned_at_epoch_ms: now,
                            away_seconds,
                            is_distraction,
                        });
                        debug!(away_ms, is_distraction, "surface visible again");
                        Transition::Visible(away_seconds)
                    }
                    // Hidden before we started watching: nothing to count.
                    None => {
                        tracker.last_interval = None;
                        Transition::Visible(0)
                    }
                }
            }
        };

        let mut observer = self.observer.borrow_mut();
        match transition {
            Transition::Hidden => (observer.on_became_hidden)(),
            Transition::Visible(away_seconds) => (observer.on_became_visible)(away_seconds),
        }
    }
}

/// Owns the platform subscription. Dropping it unsubscribes.
pub struct VisibilityHandle {
    source: Rc<dyn VisibilitySource>,
    shared: Rc<Shared>,
    subscription: Option<SubscriptionId>,
}

impl fmt::Debug for VisibilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityHandle")
            .field("state", &self.current_state())
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}

/// Start watching `source`.
///
/// With `config.enabled == false` nothing is subscribed and no callback
/// ever fires until [`VisibilityHandle::set_enabled`] turns it on.
pub fn observe(
    source: Rc<dyn VisibilitySource>,
    clock: SharedClock,
    config: &VisibilityConfig,
    observer: VisibilityObserver,
) -> VisibilityHandle {
    let min_distraction_ms = i64::try_from(config.min_distraction_seconds)
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000);
    let shared = Rc::new(Shared {
        clock,
        min_distraction_ms,
        tracker: RefCell::new(Tracker {
            state: VisibilityState {
                is_foreground: source.is_foreground(),
                ..VisibilityState::default()
            },
            left_at_ms: None,
            last_interval: None,
        }),
        observer: RefCell::new(observer),
    });
    let mut handle = VisibilityHandle {
        source,
        shared,
        subscription: None,
    };
    if config.enabled {
        handle.subscribe();
    }
    handle
}

impl VisibilityHandle {
    pub fn current_state(&self) -> VisibilityState {
        self.shared.tracker.borrow().state
    }

    pub fn last_away_interval(&self) -> Option<AwayInterval> {
        self.shared.tracker.borrow().last_interval
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Clear counters and re-read the current visibility.
    ///
    /// If the surface is hidden right now, the away interval is measured
    /// from this call.
    pub fn reset_tracking(&self) {
        let foreground = self.source.is_foreground();
        let now = self.shared.clock.now_ms();
        let mut tracker = self.shared.tracker.borrow_mut();
        tracker.state = VisibilityState {
            is_foreground: foreground,
            ..VisibilityState::default()
        };
        tracker.left_at_ms = (!foreground).then_some(now);
        tracker.last_interval = None;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        match (enabled, self.subscription.is_some()) {
            (true, false) => {
                let foreground = self.source.is_foreground();
                {
                    let mut tracker = self.shared.tracker.borrow_mut();
                    tracker.state.is_foreground = foreground;
                    tracker.left_at_ms = None;
                }
                self.subscribe();
            }
            (false, true) => self.unsubscribe(),
            _ => {}
        }
    }

    fn subscribe(&mut self) {
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        let id = self.source.subscribe(Box::new(move |foreground| {
            if let Some(shared) = weak.upgrade() {
                shared.handle(foreground);
            }
        }));
        self.subscription = Some(id);
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.source.unsubscribe(id);
        }
    }
}

impl Drop for VisibilityHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
