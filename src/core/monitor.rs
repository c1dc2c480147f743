use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::core::config::MonitorConfig;
use crate::core::idle::{Action, IdleState};
use crate::core::lifecycle::Controller;
use crate::core::models::status::{StopOutcome, StopReason};

/// What one tick saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Observation {
    /// Instance stopped or without an address; nothing to probe.
    InstanceDown,
    /// Instance status or game server ping failed.
    Unreachable(String),
    Players(u32),
}

/// Polls the game server and stops the instance after a sustained empty streak.
pub struct IdleScheduler {
    controller: Arc<Controller>,
    idle: IdleState,
    poll_interval: Duration,
    seen_epoch: u64,
}

impl IdleScheduler {
    pub fn new(controller: Arc<Controller>, config: &MonitorConfig) -> Self {
        let seen_epoch = controller.start_epoch();
        Self {
            controller,
            idle: IdleState::new(config.idle_threshold()),
            poll_interval: config.poll_interval(),
            seen_epoch,
        }
    }

    pub fn idle(&self) -> &IdleState {
        &self.idle
    }

    pub async fn observe(&self) -> Observation {
        let state = match self.controller.instance_state().await {
            Ok(state) => state,
            Err(e) => {
                if !e.is_transient() {
                    error!(error = %e, "unexpected instance status failure");
                }
                return Observation::Unreachable(e.to_string());
            }
        };
        let Some(address) = state.probe_address() else {
            return Observation::InstanceDown;
        };
        match self.controller.ping(address).await {
            Ok(ping) => Observation::Players(ping.players_online),
            Err(e) => Observation::Unreachable(e.to_string()),
        }
    }

    /// Fold one observation into the idle clock.
    ///
    /// Only a confirmed player count moves the clock. A failed observation
    /// leaves it exactly as it was.
    pub fn apply(&mut self, observation: &Observation, now: DateTime<Utc>) -> Action {
        match observation {
            Observation::InstanceDown => {
                self.idle.reset();
                Action::NoAction
            }
            Observation::Unreachable(reason) => {
                warn!(%reason, "observation failed, idle clock unchanged");
                Action::NoAction
            }
            Observation::Players(count) => self.idle.on_poll(*count, now),
        }
    }

    pub async fn tick(&mut self, now: DateTime<Utc>) -> Action {
        let epoch = self.controller.start_epoch();
        if epoch != self.seen_epoch {
            debug!(epoch, "instance started since last tick, idle clock reset");
            self.seen_epoch = epoch;
            self.idle.reset();
        }

        let observation = self.observe().await;
        let action = self.apply(&observation, now);
        debug!(
            ?observation,
            phase = ?self.idle.phase(),
            empty_since = ?self.idle.empty_since(),
            idle_secs = self.idle.idle_for(now).num_seconds(),
            "tick"
        );

        if action == Action::TriggerShutdown {
            info!(
                threshold_secs = self.idle.threshold().num_seconds(),
                "server idle past threshold, stopping"
            );
            match self.controller.request_stop(StopReason::Idle).await {
                Ok(StopOutcome::Stopped(_)) => info!("idle shutdown complete"),
                Ok(other) => info!(outcome = ?other, "idle shutdown skipped"),
                Err(e) => error!(error = %e, "idle shutdown failed"),
            }
        }
        action
    }

    /// Tick on a fixed interval until `shutdown` changes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_secs = self.poll_interval.as_secs(),
            threshold_secs = self.idle.threshold().num_seconds(),
            "idle monitor starting"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    info!("idle monitor shutting down");
                    break;
                }
            }
        }
    }
}
