use serde::{Deserialize, Serialize};

/// Focused/away accounting for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub focused_seconds: u64,
    pub away_seconds: u64,
    pub is_paused: bool,
    pub is_running: bool,
}

impl TimerState {
    /// A stopped state holding the given counters.
    pub fn with_counters(focused_seconds: u64, away_seconds: u64) -> Self {
        Self {
            focused_seconds,
            away_seconds,
            is_paused: false,
            is_running: false,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.focused_seconds.saturating_add(self.away_seconds)
    }

    pub fn focus_score(&self) -> u8 {
        focus_score(self.focused_seconds, self.away_seconds)
    }
}

/// Percentage of total time that was focused, rounded half up.
///
/// A session with no elapsed time scores 100.
pub fn focus_score(focused_seconds: u64, away_seconds: u64) -> u8 {
    let focused = u128::from(focused_seconds);
    let total = focused + u128::from(away_seconds);
    if total == 0 {
        return 100;
    }
    // floor(100 * f / t + 1/2) without floating point
    let score = (200 * focused + total) / (2 * total);
    score.min(100) as u8
}

/// Lifecycle phase of a [`TimerEngine`](super::TimerEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Stopped,
    /// Running but not accruing focused time.
    Paused,
    Active,
}

/// Why focused time stopped accruing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The caller paused (or resumed) explicitly.
    User,
    /// The host surface went to the background (or came back).
    Hidden,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_session_scores_full() {
        assert_eq!(focus_score(0, 0), 100);
        assert_eq!(TimerState::default().focus_score(), 100);
    }

    #[test]
    fn score_rounds_half_up() {
        assert_eq!(focus_score(120, 10), 92);
        assert_eq!(focus_score(1, 1), 50);
        // 100 * 1 / 8 = 12.5
        assert_eq!(focus_score(1, 7), 13);
        // 100 * 1 / 3 = 33.33
        assert_eq!(focus_score(1, 2), 33);
        assert_eq!(focus_score(0, 10), 0);
        assert_eq!(focus_score(10, 0), 100);
    }

    #[test]
    fn score_survives_extreme_counters() {
        assert_eq!(focus_score(u64::MAX, 0), 100);
        assert_eq!(focus_score(u64::MAX, u64::MAX), 50);
        assert_eq!(TimerState::with_counters(u64::MAX, 1).total_seconds(), u64::MAX);
    }

    proptest! {
        #[test]
        fn score_matches_rounded_ratio(focused in 0u64..10_000_000, away in 0u64..10_000_000) {
            let score = focus_score(focused, away);
            prop_assert!(score <= 100);
            let total = focused + away;
            let expected = if total == 0 {
                100
            } else {
                (100.0 * focused as f64 / total as f64).round() as u8
            };
            prop_assert_eq!(score, expected);
        }
    }
}
