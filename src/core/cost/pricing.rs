use chrono::{DateTime, Utc};

use crate::core::error::KeeperError;
use crate::core::models::cost::SessionCostReport;
use crate::core::models::rates::{HourlyRates, RateSnapshot};

/// Catalog disk prices are per GB-month; Google bills a month as 730 hours.
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Base-tier USD prices pulled from the pricing catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogPrices {
    /// Per vCPU-hour
    pub core_hourly: f64,
    /// Per GB-hour of memory
    pub ram_gb_hourly: f64,
    /// Per GB-month of standard persistent disk
    pub pd_gb_monthly: f64,
}

/// Combine catalog unit prices with the machine shape into hourly USD rates.
pub fn hourly_from_catalog(
    prices: &CatalogPrices,
    vcpus: u32,
    memory_gb: f64,
    disk_gb: f64,
) -> HourlyRates {
    HourlyRates {
        instance: prices.core_hourly * vcpus as f64 + prices.ram_gb_hourly * memory_gb,
        disk: prices.pd_gb_monthly * disk_gb / HOURS_PER_MONTH,
    }
}

/// Runtime rounded up to whole minutes; compute is billed per started minute.
pub fn billed_minutes(runtime_secs: i64) -> i64 {
    (runtime_secs.max(0) + 59) / 60
}

/// Cost of a session running from `started_at` to `now` at the snapshot's rates.
///
/// Zero when `now == started_at`, and non-decreasing as `now` advances.
pub fn session_cost(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    rates: &RateSnapshot,
) -> Result<SessionCostReport, KeeperError> {
    let runtime_secs = (now - started_at).num_seconds();
    if now < started_at {
        return Err(KeeperError::InvalidState(format!(
            "session start {} is after {}",
            started_at.to_rfc3339(),
            now.to_rfc3339()
        )));
    }

    let billed = billed_minutes(runtime_secs);
    let hours = billed as f64 / 60.0;
    Ok(SessionCostReport {
        started_at,
        ended_at: now,
        runtime_secs,
        billed_minutes: billed,
        session_cost: hours * rates.hourly_total(),
    })
}
