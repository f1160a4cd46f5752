mod monitor;
mod source;

pub use monitor::{
    observe, AwayInterval, LastDistraction, VisibilityHandle, VisibilityObserver, VisibilityState,
};
pub use source::{ManualVisibility, SubscriptionId, VisibilityListener, VisibilitySource};
