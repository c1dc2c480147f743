use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::core::config::AppConfig;
use crate::core::cost::report::month_start;
use crate::core::cost::CostCalculator;
use crate::core::error::KeeperError;
use crate::core::formatter;
use crate::core::models::cost::MonthlyCostReport;
use crate::core::models::instance::InstanceState;
use crate::core::models::rates::RateSnapshot;
use crate::core::models::status::{
    BackupOutcome, ServerPing, StatusReport, StopOutcome, StopReason, StopReport,
};
use crate::core::providers::Collaborators;

/// The one path manual commands and the idle scheduler go through.
///
/// Serialises stop sequences, tracks manual starts for the scheduler and
/// turns every outcome into a notifier message.
pub struct Controller {
    collaborators: Collaborators,
    costs: CostCalculator,
    /// Held for the whole stop sequence; a second stop fails `try_lock`.
    shutdown_gate: Mutex<()>,
    /// Bumped on every successful manual start.
    start_epoch: AtomicU64,
    call_timeout: Duration,
}

impl Controller {
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        let costs = CostCalculator::new(
            &config.rates,
            collaborators.pricing.clone(),
            collaborators.exchange.clone(),
            collaborators.billing.clone(),
        );
        Self {
            collaborators,
            costs,
            shutdown_gate: Mutex::new(()),
            start_epoch: AtomicU64::new(0),
            call_timeout: config.monitor.probe_timeout(),
        }
    }

    pub fn start_epoch(&self) -> u64 {
        self.start_epoch.load(Ordering::SeqCst)
    }

    pub fn currency(&self) -> &str {
        self.costs.currency()
    }

    async fn bounded<T, F>(
        &self,
        fut: F,
        what: &str,
        on_timeout: fn(String) -> KeeperError,
    ) -> Result<T, KeeperError>
    where
        F: Future<Output = Result<T, KeeperError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!(
                "{} timed out after {}s",
                what,
                self.call_timeout.as_secs()
            ))),
        }
    }

    /// Instance status, bounded by the probe timeout.
    ///
    /// Credentials are acquired first and outside that bound, so a slow
    /// first token mint is not cancelled and retried on every tick.
    pub async fn instance_state(&self) -> Result<InstanceState, KeeperError> {
        self.collaborators.lifecycle.prepare().await?;
        self.bounded(
            self.collaborators.lifecycle.status(),
            "instance status",
            KeeperError::Query,
        )
        .await
    }

    /// Game server ping, bounded by the probe timeout.
    pub async fn ping(&self, address: &str) -> Result<ServerPing, KeeperError> {
        self.bounded(
            self.collaborators.probe.ping(address),
            "server ping",
            KeeperError::Unreachable,
        )
        .await
    }

    async fn notify(&self, text: &str) {
        self.collaborators.notifier.send(text).await;
    }

    pub async fn request_start(&self) -> Result<String, KeeperError> {
        if self.shutdown_gate.try_lock().is_err() {
            let err = KeeperError::InvalidState("a shutdown is in progress".to_string());
            self.notify(&format!("Cannot start server: {}", err)).await;
            return Err(err);
        }

        info!("starting instance");
        match self.collaborators.lifecycle.start().await {
            Ok(address) => {
                let epoch = self.start_epoch.fetch_add(1, Ordering::SeqCst) + 1;
                info!(%address, epoch, "instance started");
                self.notify(&formatter::format_start_message(&address))
                    .await;
                Ok(address)
            }
            Err(e) => {
                error!(error = %e, "instance start failed");
                self.notify(&format!("Failed to start server: {}", e)).await;
                Err(e)
            }
        }
    }

    /// Run the stop sequence: backup, session cost, stop, notify.
    ///
    /// Only one sequence runs at a time. The instance is stopped even if the
    /// backup fails.
    pub async fn request_stop(&self, reason: StopReason) -> Result<StopOutcome, KeeperError> {
        let Ok(_guard) = self.shutdown_gate.try_lock() else {
            info!(%reason, "stop already in progress");
            return Ok(StopOutcome::AlreadyInProgress);
        };

        let state = match self.instance_state().await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "cannot stop, instance status unknown");
                self.notify(&format!("Failed to stop server: {}", e)).await;
                return Err(e);
            }
        };
        if !state.is_running() {
            debug!(status = %state.status, "instance already stopped");
            return Ok(StopOutcome::AlreadyStopped);
        }

        let stopped_at = Utc::now();
        info!(%reason, "stop sequence started");

        let backup = match (&self.collaborators.backup, state.address.as_deref()) {
            (None, _) => BackupOutcome::Disabled,
            (Some(_), None) => {
                warn!("skipping backup, instance has no public address");
                BackupOutcome::Failed("instance has no public address".to_string())
            }
            (Some(service), Some(address)) => match service.run(address).await {
                Ok(object) => {
                    info!(%object, "world backup stored");
                    BackupOutcome::Stored(object)
                }
                Err(e) => {
                    warn!(error = %e, "world backup failed, stopping anyway");
                    BackupOutcome::Failed(e.to_string())
                }
            },
        };

        let session = match state.started_at {
            Some(started_at) => match self.costs.session_cost(started_at, stopped_at).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "session cost unavailable");
                    None
                }
            },
            None => {
                warn!("instance reported no start time, session cost unavailable");
                None
            }
        };

        if let Err(e) = self.collaborators.lifecycle.stop().await {
            error!(error = %e, "instance stop failed");
            self.notify(&format!("Failed to stop server: {}", e)).await;
            return Err(e);
        }
        info!("instance stopped");

        let month_to_date = match self
            .costs
            .monthly_cost(month_start(stopped_at), stopped_at)
            .await
        {
            Ok(report) => Some(report.total_cost),
            Err(e) if e.is_upstream() => {
                debug!(error = %e, "month-to-date cost unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "month-to-date cost failed");
                None
            }
        };

        let report = StopReport {
            reason,
            stopped_at,
            backup,
            session,
            month_to_date,
            currency: self.currency().to_string(),
        };
        self.notify(&formatter::format_stop_summary(&report)).await;
        Ok(StopOutcome::Stopped(report))
    }

    /// Running state, players and accrued cost. An unresponsive game server
    /// is reported as `reachable: false`, not as an error.
    pub async fn request_status(&self) -> Result<StatusReport, KeeperError> {
        match self.status_report().await {
            Ok(report) => {
                self.notify(&formatter::format_status_message(&report)).await;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "status query failed");
                self.notify(&format!("Failed to get server status: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn status_report(&self) -> Result<StatusReport, KeeperError> {
        let state = self.instance_state().await?;
        let currency = self.currency().to_string();

        let Some(address) = state.probe_address() else {
            return Ok(StatusReport {
                running: state.is_running(),
                address: state.address.clone(),
                reachable: false,
                players: None,
                session: None,
                currency,
            });
        };

        let players = match self.ping(address).await {
            Ok(ping) => Some(ping),
            Err(e) => {
                debug!(error = %e, "status ping failed");
                None
            }
        };

        let session = match state.started_at {
            Some(started_at) => match self.costs.session_cost(started_at, Utc::now()).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "session cost unavailable");
                    None
                }
            },
            None => None,
        };

        Ok(StatusReport {
            running: true,
            address: Some(address.to_string()),
            reachable: players.is_some(),
            players,
            session,
            currency,
        })
    }

    pub async fn request_monthly_cost(&self) -> Result<MonthlyCostReport, KeeperError> {
        let now = Utc::now();
        match self.costs.monthly_cost(month_start(now), now).await {
            Ok(report) => {
                self.notify(&formatter::format_monthly_message(&report)).await;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "monthly cost query failed");
                self.notify(&format!("Failed to get monthly costs: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    pub async fn current_rates(&self) -> RateSnapshot {
        let rates = self.costs.refresh_rates(Utc::now()).await;
        self.notify(&formatter::format_rates_message(&rates, self.currency()))
            .await;
        rates
    }
}
