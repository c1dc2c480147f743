use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::core::models::cost::{BillingLineItem, MonthlyCostReport};

/// First instant of the calendar month containing `now`, in UTC.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Convert USD line items and fold them into a per-service report.
///
/// Rows for the same service are summed.
pub fn aggregate(
    items: &[BillingLineItem],
    exchange_rate: f64,
    currency: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> MonthlyCostReport {
    let mut by_service: BTreeMap<String, f64> = BTreeMap::new();
    for item in items {
        *by_service.entry(item.service.clone()).or_insert(0.0) += item.cost_usd * exchange_rate;
    }
    let total_cost = by_service.values().sum();

    MonthlyCostReport {
        window_start,
        window_end,
        currency: currency.to_string(),
        exchange_rate,
        by_service,
        total_cost,
    }
}
