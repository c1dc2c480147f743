use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::error::KeeperError;
use crate::core::models::cost::BillingLineItem;
use crate::core::models::instance::{InstanceState, InstanceStatus};
use crate::core::models::rates::HourlyRates;
use crate::core::models::status::ServerPing;
use crate::core::providers::{
    BackupService, BillingService, Collaborators, ExchangeRateProvider, GameServerProbe,
    InstanceLifecycle, Notifier, PricingService,
};

pub const ADDRESS: &str = "34.84.10.20";

pub struct FakeLifecycle {
    pub state: Mutex<Result<InstanceState, KeeperError>>,
    pub start_result: Mutex<Result<String, KeeperError>>,
    pub stop_result: Mutex<Result<(), KeeperError>>,
    pub stop_delay: Duration,
    pub status_delay: Duration,
    pub prepare_delay: Duration,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub prepares: AtomicUsize,
}

impl FakeLifecycle {
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self::with_state(InstanceState {
            status: InstanceStatus::Running,
            address: Some(ADDRESS.to_string()),
            started_at: Some(started_at),
        })
    }

    pub fn stopped() -> Self {
        Self::with_state(InstanceState::stopped())
    }

    fn with_state(state: InstanceState) -> Self {
        Self {
            state: Mutex::new(Ok(state)),
            start_result: Mutex::new(Ok(ADDRESS.to_string())),
            stop_result: Mutex::new(Ok(())),
            stop_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            prepare_delay: Duration::ZERO,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            prepares: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: Result<InstanceState, KeeperError>) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl InstanceLifecycle for FakeLifecycle {
    async fn start(&self) -> Result<String, KeeperError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let result = self.start_result.lock().unwrap().clone();
        if let Ok(address) = &result {
            self.set_state(Ok(InstanceState {
                status: InstanceStatus::Running,
                address: Some(address.clone()),
                started_at: Some(Utc::now()),
            }));
        }
        result
    }

    async fn stop(&self) -> Result<(), KeeperError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        let result = self.stop_result.lock().unwrap().clone();
        if result.is_ok() {
            self.set_state(Ok(InstanceState::stopped()));
        }
        result
    }

    async fn status(&self) -> Result<InstanceState, KeeperError> {
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.state.lock().unwrap().clone()
    }

    async fn prepare(&self) -> Result<(), KeeperError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        if !self.prepare_delay.is_zero() {
            tokio::time::sleep(self.prepare_delay).await;
        }
        Ok(())
    }
}

pub struct FakeProbe {
    pub result: Mutex<Result<ServerPing, KeeperError>>,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn players(online: u32) -> Self {
        Self {
            result: Mutex::new(Ok(ping(online))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, result: Result<ServerPing, KeeperError>) {
        *self.result.lock().unwrap() = result;
    }
}

pub fn ping(online: u32) -> ServerPing {
    ServerPing {
        players_online: online,
        players_max: 20,
        latency_ms: 8,
    }
}

#[async_trait]
impl GameServerProbe for FakeProbe {
    async fn ping(&self, _address: &str) -> Result<ServerPing, KeeperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

pub struct FakeBackup {
    pub result: Result<String, KeeperError>,
    pub calls: AtomicUsize,
}

impl FakeBackup {
    pub fn ok() -> Self {
        Self {
            result: Ok("world_backup_20261018_120000.tar.gz".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(KeeperError::Backup("scp: connection reset".to_string())),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BackupService for FakeBackup {
    async fn run(&self, _address: &str) -> Result<String, KeeperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub struct FakePricing {
    pub result: Result<HourlyRates, KeeperError>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakePricing {
    pub fn ok(instance: f64, disk: f64) -> Self {
        Self {
            result: Ok(HourlyRates { instance, disk }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(KeeperError::PriceUnavailable("catalog returned HTTP 503".to_string())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PricingService for FakePricing {
    async fn hourly_rates(&self) -> Result<HourlyRates, KeeperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

pub struct FakeExchange {
    pub result: Result<f64, KeeperError>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeExchange {
    pub fn ok(rate: f64) -> Self {
        Self {
            result: Ok(rate),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(KeeperError::RateUnavailable("timeout".to_string())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ExchangeRateProvider for FakeExchange {
    async fn rate(&self) -> Result<f64, KeeperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

pub struct FakeBilling {
    pub result: Result<Vec<BillingLineItem>, KeeperError>,
}

impl FakeBilling {
    pub fn items(items: &[(&str, f64)]) -> Self {
        Self {
            result: Ok(items
                .iter()
                .map(|(service, cost)| BillingLineItem {
                    service: service.to_string(),
                    cost_usd: *cost,
                })
                .collect()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(KeeperError::BillingUnavailable(
                "no billing export table configured".to_string(),
            )),
        }
    }
}

#[async_trait]
impl BillingService for FakeBilling {
    async fn month_to_date(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<BillingLineItem>, KeeperError> {
        self.result.clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Handles to every fake, plus the bundle the controller consumes.
pub struct Harness {
    pub lifecycle: Arc<FakeLifecycle>,
    pub probe: Arc<FakeProbe>,
    pub backup: Arc<FakeBackup>,
    pub pricing: Arc<FakePricing>,
    pub exchange: Arc<FakeExchange>,
    pub notifier: Arc<RecordingNotifier>,
    pub collaborators: Collaborators,
}

impl Harness {
    pub fn new(lifecycle: FakeLifecycle, probe: FakeProbe, backup: FakeBackup) -> Self {
        let lifecycle = Arc::new(lifecycle);
        let probe = Arc::new(probe);
        let backup = Arc::new(backup);
        let pricing = Arc::new(FakePricing::ok(0.08, 0.002));
        let exchange = Arc::new(FakeExchange::ok(150.0));
        let notifier = Arc::new(RecordingNotifier::default());
        let collaborators = Collaborators {
            lifecycle: lifecycle.clone(),
            probe: probe.clone(),
            backup: Some(backup.clone()),
            pricing: pricing.clone(),
            exchange: exchange.clone(),
            billing: Arc::new(FakeBilling::items(&[("Compute Engine", 4.0), ("Cloud Storage", 0.5)])),
            notifier: notifier.clone(),
        };
        Self {
            lifecycle,
            probe,
            backup,
            pricing,
            exchange,
            notifier,
            collaborators,
        }
    }
}
