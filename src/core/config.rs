use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::models::rates::HourlyRates;

/// Longest accepted value for any `*_secs` setting (30 days).
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound for each instance query and game server ping
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_idle_threshold() -> u64 {
    300
}
fn default_poll_interval() -> u64 {
    60
}
fn default_probe_timeout() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold(),
            poll_interval_secs: default_poll_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl MonitorConfig {
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_threshold_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_instance_name")]
    pub name: String,
}

fn default_zone() -> String {
    "asia-northeast1-b".to_string()
}
fn default_instance_name() -> String {
    "minecraft".to_string()
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            zone: default_zone(),
            name: default_instance_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_game_port")]
    pub port: u16,
}

fn default_game_port() -> u16 {
    25565
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            port: default_game_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Upper bound for each pricing catalog and exchange rate lookup
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// ISO 4217 code the USD prices are converted into
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_exchange_rate")]
    pub fallback_exchange_rate: f64,
    /// USD per hour, used when the pricing catalog is unavailable
    #[serde(default = "default_instance_hourly")]
    pub fallback_instance_hourly: f64,
    /// USD per hour, used when the pricing catalog is unavailable
    #[serde(default = "default_disk_hourly")]
    pub fallback_disk_hourly: f64,
    #[serde(default = "default_region")]
    pub region: String,
    /// Machine series as it appears in SKU descriptions ("E2", "N2", ...)
    #[serde(default = "default_machine_series")]
    pub machine_series: String,
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,
    #[serde(default = "default_memory_gb")]
    pub memory_gb: f64,
    #[serde(default = "default_disk_gb")]
    pub disk_gb: f64,
    /// Price the instance as a spot (preemptible) VM
    #[serde(default = "default_true")]
    pub spot: bool,
}

fn default_cache_ttl() -> u64 {
    3600
}
fn default_upstream_timeout() -> u64 {
    10
}
fn default_currency() -> String {
    "JPY".to_string()
}
fn default_exchange_rate() -> f64 {
    110.0
}
fn default_instance_hourly() -> f64 {
    0.0836
}
fn default_disk_hourly() -> f64 {
    0.000068
}
fn default_region() -> String {
    "asia-northeast1".to_string()
}
fn default_machine_series() -> String {
    "E2".to_string()
}
fn default_vcpus() -> u32 {
    2
}
fn default_memory_gb() -> f64 {
    8.0
}
fn default_disk_gb() -> f64 {
    20.0
}
fn default_true() -> bool {
    true
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            upstream_timeout_secs: default_upstream_timeout(),
            currency: default_currency(),
            fallback_exchange_rate: default_exchange_rate(),
            fallback_instance_hourly: default_instance_hourly(),
            fallback_disk_hourly: default_disk_hourly(),
            region: default_region(),
            machine_series: default_machine_series(),
            vcpus: default_vcpus(),
            memory_gb: default_memory_gb(),
            disk_gb: default_disk_gb(),
            spot: default_true(),
        }
    }
}

impl RatesConfig {
    pub fn fallback_rates(&self) -> HourlyRates {
        HourlyRates {
            instance: self.fallback_instance_hourly,
            disk: self.fallback_disk_hourly,
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_world_dir")]
    pub world_dir: String,
    #[serde(default = "default_world_name")]
    pub world_name: String,
    /// Defaults to "<project>-minecraft-backups"
    pub bucket: Option<String>,
}

fn default_ssh_user() -> String {
    "minecraft".to_string()
}
fn default_world_dir() -> String {
    "/minecraft/server".to_string()
}
fn default_world_name() -> String {
    "world".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ssh_user: default_ssh_user(),
            world_dir: default_world_dir(),
            world_name: default_world_name(),
            bucket: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Fully-qualified BigQuery billing export table (`project.dataset.table`)
    pub export_table: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("sk").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Secrets may live in the environment instead of the file.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SK_WEBHOOK_URL") {
            if !url.is_empty() {
                self.notifier.webhook_url = Some(url);
            }
        }
    }

    /// Serialize and write this config to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn backup_bucket(&self) -> String {
        self.backup
            .bucket
            .clone()
            .unwrap_or_else(|| format!("{}-minecraft-backups", self.instance.project))
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        for (field, value, min) in [
            ("monitor.poll_interval_secs", self.monitor.poll_interval_secs, 1),
            ("monitor.idle_threshold_secs", self.monitor.idle_threshold_secs, 1),
            ("monitor.probe_timeout_secs", self.monitor.probe_timeout_secs, 1),
            ("rates.cache_ttl_secs", self.rates.cache_ttl_secs, 0),
            ("rates.upstream_timeout_secs", self.rates.upstream_timeout_secs, 1),
        ] {
            if value < min {
                issues.push(format!("{} must be greater than 0", field));
            } else if value > MAX_DURATION_SECS {
                issues.push(format!(
                    "{} must be at most {}, got {}",
                    field, MAX_DURATION_SECS, value
                ));
            }
        }
        for (field, value) in [
            ("instance.project", &self.instance.project),
            ("instance.zone", &self.instance.zone),
            ("instance.name", &self.instance.name),
        ] {
            if value.trim().is_empty() {
                issues.push(format!("{} is empty", field));
            }
        }
        if !(self.rates.fallback_exchange_rate > 0.0) {
            issues.push(format!(
                "rates.fallback_exchange_rate must be positive, got {}",
                self.rates.fallback_exchange_rate
            ));
        }
        if self.rates.fallback_instance_hourly < 0.0 || self.rates.fallback_disk_hourly < 0.0 {
            issues.push("rates fallback hourly prices must not be negative".to_string());
        }
        if self.rates.currency.len() != 3 {
            issues.push(format!(
                "rates.currency must be a 3-letter code, got '{}'",
                self.rates.currency
            ));
        }
        if let Some(url) = &self.notifier.webhook_url {
            if !url.starts_with("https://") {
                issues.push(format!("notifier.webhook_url must use HTTPS, got: {}", url));
            }
        }
        issues
    }
}
