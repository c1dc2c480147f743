use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// What the scheduler should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoAction,
    TriggerShutdown,
}

/// Phase derived from the idle clock, for logging and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePhase {
    Active,
    Idling,
}

/// Idle clock owned by the scheduler task.
///
/// Each poll feeds one player count into [`IdleState::on_poll`], which either
/// keeps waiting or asks for a shutdown once the server has been empty for
/// longer than the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleState {
    threshold: Duration,
    /// Moment the current zero-player streak was first observed.
    /// `None` while players are online or after a shutdown was triggered.
    empty_since: Option<DateTime<Utc>>,
}

impl IdleState {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            empty_since: None,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn empty_since(&self) -> Option<DateTime<Utc>> {
        self.empty_since
    }

    pub fn phase(&self) -> IdlePhase {
        match self.empty_since {
            Some(_) => IdlePhase::Idling,
            None => IdlePhase::Active,
        }
    }

    /// Time the server has been empty as of `now`, zero when no clock is running.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        self.empty_since
            .map(|since| (now - since).max(Duration::zero()))
            .unwrap_or_else(Duration::zero)
    }

    /// Record one confirmed player-count reading.
    pub fn on_poll(&mut self, player_count: u32, now: DateTime<Utc>) -> Action {
        if player_count > 0 {
            self.empty_since = None;
            return Action::NoAction;
        }

        match self.empty_since {
            None => {
                self.empty_since = Some(now);
                Action::NoAction
            }
            Some(since) if now - since > self.threshold => {
                // Cleared in the same transition so the next tick cannot re-trigger
                // while the shutdown is still running.
                self.empty_since = None;
                Action::TriggerShutdown
            }
            Some(_) => Action::NoAction,
        }
    }

    /// Drop any running idle clock (instance stopped, or freshly started).
    pub fn reset(&mut self) {
        self.empty_since = None;
    }
}
