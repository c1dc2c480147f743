use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cost accrued by the current (or just-stopped) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCostReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock runtime in seconds
    pub runtime_secs: i64,
    /// Minutes actually billed (runtime rounded up to a whole minute)
    pub billed_minutes: i64,
    pub session_cost: f64,
}

impl SessionCostReport {
    pub fn runtime(&self) -> Duration {
        Duration::seconds(self.runtime_secs)
    }
}

/// One row of the provider's month-to-date billing export, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingLineItem {
    pub service: String,
    pub cost_usd: f64,
}

/// Month-to-date spend converted to the local currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCostReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub currency: String,
    pub exchange_rate: f64,
    pub by_service: BTreeMap<String, f64>,
    pub total_cost: f64,
}
