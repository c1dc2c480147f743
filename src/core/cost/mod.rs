pub mod cache;
pub mod pricing;
pub mod report;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::config::RatesConfig;
use crate::core::error::KeeperError;
use crate::core::models::cost::{MonthlyCostReport, SessionCostReport};
use crate::core::models::rates::RateSnapshot;
use crate::core::providers::{BillingService, ExchangeRateProvider, PricingService};

use cache::{exchange_rate_or, RateCache};

/// Session and month-to-date cost, in the configured local currency.
pub struct CostCalculator {
    rates: RateCache,
    exchange: Arc<dyn ExchangeRateProvider>,
    billing: Arc<dyn BillingService>,
    currency: String,
    fallback_exchange: f64,
    upstream_timeout: std::time::Duration,
}

impl CostCalculator {
    pub fn new(
        config: &RatesConfig,
        pricing: Arc<dyn PricingService>,
        exchange: Arc<dyn ExchangeRateProvider>,
        billing: Arc<dyn BillingService>,
    ) -> Self {
        Self {
            rates: RateCache::new(config, pricing, exchange.clone()),
            exchange,
            billing,
            currency: config.currency.to_uppercase(),
            fallback_exchange: config.fallback_exchange_rate,
            upstream_timeout: config.upstream_timeout(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub async fn refresh_rates(&self, now: DateTime<Utc>) -> RateSnapshot {
        self.rates.refresh_rates(now).await
    }

    /// Cost of the session that started at `started_at`, as of `now`.
    pub async fn session_cost(
        &self,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionCostReport, KeeperError> {
        let rates = self.rates.refresh_rates(now).await;
        pricing::session_cost(started_at, now, &rates)
    }

    /// Month-to-date spend from the billing export, converted at a fresh rate.
    pub async fn monthly_cost(
        &self,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MonthlyCostReport, KeeperError> {
        let items = self.billing.month_to_date(window_start, now).await?;
        let (rate, _) = exchange_rate_or(
            self.exchange.as_ref(),
            self.fallback_exchange,
            self.upstream_timeout,
        )
        .await;
        Ok(report::aggregate(&items, rate, &self.currency, window_start, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::fakes::{FakeBilling, FakeExchange, FakePricing};
    use chrono::{Duration, TimeZone};

    fn calculator(billing: FakeBilling, exchange: FakeExchange) -> CostCalculator {
        calculator_with(Arc::new(FakePricing::ok(10.0 / 150.0, 2.0 / 150.0)), billing, exchange)
    }

    fn calculator_with(
        pricing: Arc<FakePricing>,
        billing: FakeBilling,
        exchange: FakeExchange,
    ) -> CostCalculator {
        CostCalculator::new(
            &RatesConfig::default(),
            pricing,
            Arc::new(exchange),
            Arc::new(billing),
        )
    }

    #[tokio::test]
    async fn session_cost_uses_cached_rates() {
        let pricing = Arc::new(FakePricing::ok(10.0 / 150.0, 2.0 / 150.0));
        let calc = calculator_with(pricing.clone(), FakeBilling::items(&[]), FakeExchange::ok(150.0));
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let report = calc
            .session_cost(start, start + Duration::seconds(5400))
            .await
            .unwrap();
        assert!((report.session_cost - 18.0).abs() < 1e-9);

        calc.session_cost(start, start + Duration::seconds(5460))
            .await
            .unwrap();
        assert_eq!(pricing.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn monthly_cost_converts_line_items() {
        let calc = calculator(
            FakeBilling::items(&[("Compute Engine", 2.0), ("Networking", 0.1)]),
            FakeExchange::ok(150.0),
        );
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let report = calc.monthly_cost(report::month_start(now), now).await.unwrap();
        assert!((report.total_cost - 315.0).abs() < 1e-9);
        assert_eq!(report.currency, "JPY");
    }

    #[tokio::test]
    async fn monthly_cost_falls_back_on_exchange_outage() {
        let calc = calculator(
            FakeBilling::items(&[("Compute Engine", 1.0)]),
            FakeExchange::failing(),
        );
        let now = Utc::now();
        let report = calc.monthly_cost(report::month_start(now), now).await.unwrap();
        assert!((report.total_cost - 110.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn billing_outage_is_reported() {
        let calc = calculator(FakeBilling::failing(), FakeExchange::ok(150.0));
        let now = Utc::now();
        let err = calc
            .monthly_cost(report::month_start(now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, KeeperError::BillingUnavailable(_)));
    }
}
