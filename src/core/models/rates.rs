use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hourly prices for the compute instance and its persistent disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyRates {
    pub instance: f64,
    pub disk: f64,
}

impl HourlyRates {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            instance: self.instance * factor,
            disk: self.disk * factor,
        }
    }
}

/// Where the numbers inside a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Catalog prices converted at a live exchange rate
    Live,
    /// At least one of pricing or exchange fell back to configured defaults
    Fallback,
}

/// Hourly rates already converted into the local currency.
///
/// Snapshots are replaced wholesale on refresh and never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub instance_hourly: f64,
    pub disk_hourly: f64,
    pub exchange_rate: f64,
    pub computed_at: DateTime<Utc>,
    pub source: RateSource,
}

impl RateSnapshot {
    pub fn hourly_total(&self) -> f64 {
        self.instance_hourly + self.disk_hourly
    }

    /// Seconds elapsed between `computed_at` and `now` (negative if `now` is earlier).
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.computed_at).num_seconds()
    }
}
