//! Periodic tick loop for hosts running a tokio runtime.
//!
//! The controller is single-threaded, so the loop runs on the caller's task
//! (a current-thread runtime or a `LocalSet`), never on a spawned worker.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::session::SessionController;
use crate::storage::{PersistentStore, TimerConfig};

/// Tick period from config, never zero.
pub fn tick_period(config: &TimerConfig) -> Duration {
    Duration::from_millis(config.tick_interval_ms.max(1))
}

/// Tick `controller` every `period` until `shutdown` resolves.
///
/// Missed periods are skipped rather than replayed; the engine credits
/// the elapsed time on the next tick either way.
pub async fn drive<S, F>(controller: &SessionController<S>, period: Duration, shutdown: F)
where
    S: PersistentStore + 'static,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                controller.tick();
            }
        }
    }
    debug!("tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::session::{SessionParts, SessionRequest};
    use crate::storage::{Config, MemoryStore};
    use crate::visibility::ManualVisibility;
    use std::rc::Rc;

    struct TokioClock {
        origin: tokio::time::Instant,
    }

    impl Clock for TokioClock {
        fn now_ms(&self) -> i64 {
            1_700_000_000_000 + self.origin.elapsed().as_millis() as i64
        }
    }

    fn controller() -> SessionController<MemoryStore> {
        SessionController::open(
            SessionRequest {
                learner_id: "a".into(),
                level: "A".into(),
                worksheet: 1,
            },
            SessionParts {
                clock: Rc::new(TokioClock {
                    origin: tokio::time::Instant::now(),
                }),
                visibility: Rc::new(ManualVisibility::new(true)),
                backend: MemoryStore::new(),
                config: Config::default(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown() {
        let controller = controller();
        drive(
            &controller,
            Duration::from_secs(1),
            tokio::time::sleep(Duration::from_millis(3_500)),
        )
        .await;
        let focused = controller.timer_state().focused_seconds;
        assert!((2..=3).contains(&focused), "focused = {focused}");
    }

    #[tokio::test(start_paused = true)]
    async fn ready_shutdown_wins() {
        let controller = controller();
        drive(&controller, Duration::from_secs(1), std::future::ready(())).await;
        assert_eq!(controller.timer_state().focused_seconds, 0);
    }

    #[test]
    fn zero_period_is_clamped() {
        let config = TimerConfig {
            tick_interval_ms: 0,
            ..TimerConfig::default()
        };
        assert_eq!(tick_period(&config), Duration::from_millis(1));
        assert_eq!(tick_period(&TimerConfig::default()), Duration::from_secs(1));
    }
}
