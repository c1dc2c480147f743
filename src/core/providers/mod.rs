pub mod backup;
pub mod billing;
pub mod catalog;
pub mod compute;
pub mod exchange;
pub mod fetch;
pub mod minecraft;
pub mod notify;

#[cfg(test)]
pub mod fakes;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::auth::AccessTokenSource;
use crate::core::config::AppConfig;
use crate::core::error::KeeperError;
use crate::core::models::cost::BillingLineItem;
use crate::core::models::instance::InstanceState;
use crate::core::models::rates::HourlyRates;
use crate::core::models::status::ServerPing;

/// Start, stop and inspect the compute instance hosting the game server.
#[async_trait]
pub trait InstanceLifecycle: Send + Sync {
    /// Start the instance and return its public address.
    async fn start(&self) -> Result<String, KeeperError>;
    async fn stop(&self) -> Result<(), KeeperError>;
    async fn status(&self) -> Result<InstanceState, KeeperError>;

    /// Acquire whatever `status` needs (credentials) before the caller starts
    /// its timeout. Implementations bound this themselves.
    async fn prepare(&self) -> Result<(), KeeperError> {
        Ok(())
    }
}

#[async_trait]
pub trait GameServerProbe: Send + Sync {
    /// Ping the game server at `address` (`host` or `host:port`).
    async fn ping(&self, address: &str) -> Result<ServerPing, KeeperError>;
}

#[async_trait]
pub trait BackupService: Send + Sync {
    /// Archive the world on the server at `address`; returns the stored object name.
    async fn run(&self, address: &str) -> Result<String, KeeperError>;
}

#[async_trait]
pub trait PricingService: Send + Sync {
    /// Hourly instance and disk prices in USD.
    async fn hourly_rates(&self) -> Result<HourlyRates, KeeperError>;
}

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Units of local currency per USD.
    async fn rate(&self) -> Result<f64, KeeperError>;
}

#[async_trait]
pub trait BillingService: Send + Sync {
    /// Per-service spend in USD between `start` and `end`.
    async fn month_to_date(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BillingLineItem>, KeeperError>;
}

/// Best-effort delivery of human-readable messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Every external collaborator the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub lifecycle: Arc<dyn InstanceLifecycle>,
    pub probe: Arc<dyn GameServerProbe>,
    pub backup: Option<Arc<dyn BackupService>>,
    pub pricing: Arc<dyn PricingService>,
    pub exchange: Arc<dyn ExchangeRateProvider>,
    pub billing: Arc<dyn BillingService>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Wire up the Google Cloud, Minecraft and webhook implementations.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = fetch::http_client()?;
        let tokens = Arc::new(AccessTokenSource::new());
        let timeout = config.monitor.probe_timeout();

        let backup: Option<Arc<dyn BackupService>> = if config.backup.enabled {
            Some(Arc::new(backup::WorldBackup::new(
                client.clone(),
                tokens.clone(),
                &config.backup,
                config.backup_bucket(),
            )))
        } else {
            None
        };

        let notifier: Arc<dyn Notifier> = match &config.notifier.webhook_url {
            Some(url) => {
                fetch::validate_endpoint(url, "Webhook")?;
                Arc::new(notify::WebhookNotifier::new(client.clone(), url.clone()))
            }
            None => Arc::new(notify::LogNotifier),
        };

        Ok(Self {
            lifecycle: Arc::new(compute::GceInstance::new(
                client.clone(),
                tokens.clone(),
                &config.instance,
                timeout,
            )),
            probe: Arc::new(minecraft::MinecraftProbe::new(config.game.port, timeout)),
            backup,
            pricing: Arc::new(catalog::CatalogPricing::new(
                client.clone(),
                tokens.clone(),
                config.rates.clone(),
            )),
            exchange: Arc::new(exchange::HttpExchangeRate::new(
                client.clone(),
                &config.rates.currency,
            )),
            billing: Arc::new(billing::BigQueryBilling::new(
                client,
                tokens,
                &config.instance.project,
                config.billing.export_table.clone(),
            )),
            notifier,
        })
    }
}
