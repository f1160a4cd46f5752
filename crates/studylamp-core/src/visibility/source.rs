//! The host platform's foreground/background signal.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Receives `true` when the surface comes to the foreground, `false` when it
/// goes to the background.
pub type VisibilityListener = Box<dyn FnMut(bool)>;

/// Opaque token returned by [`VisibilitySource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A platform capability reporting whether the session surface is foregrounded.
pub trait VisibilitySource {
    fn is_foreground(&self) -> bool;
    fn subscribe(&self, listener: VisibilityListener) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

type SharedListener = Rc<RefCell<VisibilityListener>>;

#[derive(Default)]
struct ManualInner {
    foreground: bool,
    next_id: u64,
    listeners: Vec<(SubscriptionId, SharedListener)>,
    /// Changes not yet delivered. Non-empty only while a delivery runs.
    pending: VecDeque<bool>,
    delivering: bool,
}

/// A visibility source driven in-process.
///
/// Hosts that learn about focus changes themselves (a terminal, a window
/// event loop, a test) push them with [`ManualVisibility::set_foreground`].
/// Clones share the same signal.
#[derive(Clone)]
pub struct ManualVisibility {
    inner: Rc<RefCell<ManualInner>>,
}

impl fmt::Debug for ManualVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ManualVisibility")
            .field("foreground", &inner.foreground)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl ManualVisibility {
    pub fn new(foreground: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ManualInner {
                foreground,
                ..ManualInner::default()
            })),
        }
    }

    /// Report a new foreground state. Listeners hear about changes only.
    ///
    /// A change reported from inside a listener is queued and delivered, in
    /// order, once the current delivery returns.
    pub fn set_foreground(&self, foreground: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.foreground == foreground {
                return;
            }
            inner.foreground = foreground;
            inner.pending.push_back(foreground);
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        loop {
            let (change, listeners) = {
                let mut inner = self.inner.borrow_mut();
                let Some(change) = inner.pending.pop_front() else {
                    inner.delivering = false;
                    return;
                };
                let listeners: Vec<SharedListener> =
                    inner.listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
                (change, listeners)
            };
            for listener in listeners {
                (listener.borrow_mut())(change);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl Default for ManualVisibility {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilitySource for ManualVisibility {
    fn is_foreground(&self) -> bool {
        self.inner.borrow().foreground
    }

    fn subscribe(&self, listener: VisibilityListener) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(RefCell::new(listener))));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.borrow_mut().listeners.retain(|(sid, _)| *sid != id);
    }
}
