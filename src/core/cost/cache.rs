use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::config::RatesConfig;
use crate::core::error::KeeperError;
use crate::core::models::rates::{HourlyRates, RateSnapshot, RateSource};
use crate::core::providers::{ExchangeRateProvider, PricingService};

fn timed_out(limit: std::time::Duration) -> String {
    format!("timed out after {}ms", limit.as_millis())
}

/// Fetch USD→local within `limit`, substituting `fallback` when the provider
/// fails or is too slow.
///
/// Returns the rate and whether it came from the live provider.
pub async fn exchange_rate_or(
    exchange: &dyn ExchangeRateProvider,
    fallback: f64,
    limit: std::time::Duration,
) -> (f64, bool) {
    let result = tokio::time::timeout(limit, exchange.rate())
        .await
        .unwrap_or_else(|_| Err(KeeperError::RateUnavailable(timed_out(limit))));
    match result {
        Ok(rate) => (rate, true),
        Err(e) => {
            warn!(error = %e, fallback, "exchange rate lookup failed, using fallback");
            (fallback, false)
        }
    }
}

/// Memory-resident cache of the last converted hourly rates.
///
/// Refreshes are single-flight: the lock is held across the upstream calls,
/// so concurrent callers wait for one refresh and share its result. Each
/// upstream call is bounded by `upstream_timeout`, which caps that wait.
pub struct RateCache {
    ttl: Duration,
    upstream_timeout: std::time::Duration,
    fallback_rates: HourlyRates,
    fallback_exchange: f64,
    pricing: Arc<dyn PricingService>,
    exchange: Arc<dyn ExchangeRateProvider>,
    slot: Mutex<Option<RateSnapshot>>,
}

impl RateCache {
    pub fn new(
        config: &RatesConfig,
        pricing: Arc<dyn PricingService>,
        exchange: Arc<dyn ExchangeRateProvider>,
    ) -> Self {
        Self {
            ttl: config.cache_ttl(),
            upstream_timeout: config.upstream_timeout(),
            fallback_rates: config.fallback_rates(),
            fallback_exchange: config.fallback_exchange_rate,
            pricing,
            exchange,
            slot: Mutex::new(None),
        }
    }

    fn is_fresh(&self, snapshot: &RateSnapshot, now: DateTime<Utc>) -> bool {
        now - snapshot.computed_at <= self.ttl
    }

    /// Return the cached snapshot if it is within the TTL, otherwise rebuild it.
    ///
    /// Never fails: a pricing outage uses the fallback USD rates and an
    /// exchange outage uses the fallback exchange rate. The result is cached
    /// either way so a failing upstream is not hit on every call.
    pub async fn refresh_rates(&self, now: DateTime<Utc>) -> RateSnapshot {
        let mut slot = self.slot.lock().await;
        if let Some(snapshot) = slot.as_ref() {
            if self.is_fresh(snapshot, now) {
                debug!(age_secs = snapshot.age_secs(now), "rate snapshot reused");
                return *snapshot;
            }
        }

        let priced = tokio::time::timeout(self.upstream_timeout, self.pricing.hourly_rates())
            .await
            .unwrap_or_else(|_| {
                Err(KeeperError::PriceUnavailable(timed_out(self.upstream_timeout)))
            });
        let (usd, live_prices) = match priced {
            Ok(rates) => (rates, true),
            Err(e) => {
                warn!(error = %e, "pricing lookup failed, using fallback rates");
                (self.fallback_rates, false)
            }
        };
        let (exchange_rate, live_exchange) = exchange_rate_or(
            self.exchange.as_ref(),
            self.fallback_exchange,
            self.upstream_timeout,
        )
        .await;

        let local = usd.scaled(exchange_rate);
        let snapshot = RateSnapshot {
            instance_hourly: local.instance,
            disk_hourly: local.disk,
            exchange_rate,
            computed_at: now,
            source: if live_prices && live_exchange {
                RateSource::Live
            } else {
                RateSource::Fallback
            },
        };
        info!(
            instance_hourly = snapshot.instance_hourly,
            disk_hourly = snapshot.disk_hourly,
            exchange_rate,
            source = ?snapshot.source,
            "rate snapshot refreshed"
        );
        *slot = Some(snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::fakes::{FakeExchange, FakePricing};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn cache(pricing: &Arc<FakePricing>, exchange: &Arc<FakeExchange>) -> RateCache {
        RateCache::new(&RatesConfig::default(), pricing.clone(), exchange.clone())
    }

    #[tokio::test]
    async fn live_rates_are_converted() {
        let pricing = Arc::new(FakePricing::ok(0.1, 0.002));
        let exchange = Arc::new(FakeExchange::ok(150.0));
        let snapshot = cache(&pricing, &exchange).refresh_rates(t(0)).await;
        assert!((snapshot.instance_hourly - 15.0).abs() < 1e-9);
        assert!((snapshot.disk_hourly - 0.3).abs() < 1e-9);
        assert_eq!(snapshot.source, RateSource::Live);
        assert_eq!(snapshot.computed_at, t(0));
    }

    #[tokio::test]
    async fn refresh_within_ttl_is_identical_and_offline() {
        let pricing = Arc::new(FakePricing::ok(0.1, 0.002));
        let exchange = Arc::new(FakeExchange::ok(150.0));
        let rates = cache(&pricing, &exchange);

        let first = rates.refresh_rates(t(0)).await;
        let second = rates.refresh_rates(t(3600)).await;
        assert_eq!(first, second);
        assert_eq!(
            first.instance_hourly.to_bits(),
            second.instance_hourly.to_bits()
        );
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_snapshot_is_recomputed() {
        let pricing = Arc::new(FakePricing::ok(0.1, 0.002));
        let exchange = Arc::new(FakeExchange::ok(150.0));
        let rates = cache(&pricing, &exchange);

        rates.refresh_rates(t(0)).await;
        let refreshed = rates.refresh_rates(t(3601)).await;
        assert_eq!(refreshed.computed_at, t(3601));
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pricing_failure_uses_defaults_times_live_exchange() {
        let pricing = Arc::new(FakePricing::failing());
        let exchange = Arc::new(FakeExchange::ok(150.0));
        let snapshot = cache(&pricing, &exchange).refresh_rates(t(0)).await;
        assert!((snapshot.instance_hourly - 12.54).abs() < 1e-9);
        assert!((snapshot.disk_hourly - 0.0102).abs() < 1e-9);
        assert_eq!(snapshot.source, RateSource::Fallback);
    }

    #[tokio::test]
    async fn total_outage_returns_static_defaults_and_caches_them() {
        let pricing = Arc::new(FakePricing::failing());
        let exchange = Arc::new(FakeExchange::failing());
        let rates = cache(&pricing, &exchange);

        let snapshot = rates.refresh_rates(t(0)).await;
        assert!((snapshot.exchange_rate - 110.0).abs() < 1e-12);
        assert!((snapshot.instance_hourly - 0.0836 * 110.0).abs() < 1e-9);
        assert!((snapshot.disk_hourly - 0.000068 * 110.0).abs() < 1e-12);

        // Cached for the TTL, so the failing services are not retried.
        let again = rates.refresh_rates(t(1800)).await;
        assert_eq!(snapshot, again);
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_upstream_call() {
        let pricing = Arc::new(FakePricing::ok(0.1, 0.002));
        let exchange = Arc::new(FakeExchange::ok(150.0));
        let rates = Arc::new(cache(&pricing, &exchange));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rates = rates.clone();
                tokio::spawn(async move { rates.refresh_rates(t(10)).await })
            })
            .collect();
        let mut snapshots = Vec::new();
        for handle in handles {
            snapshots.push(handle.await.unwrap());
        }
        assert!(snapshots.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_upstreams_fall_back_instead_of_blocking() {
        let pricing = Arc::new(FakePricing::ok(0.1, 0.002).delayed(std::time::Duration::from_secs(30)));
        let exchange = Arc::new(FakeExchange::ok(150.0).delayed(std::time::Duration::from_secs(30)));
        let mut rates = cache(&pricing, &exchange);
        rates.upstream_timeout = std::time::Duration::from_millis(50);

        let started = std::time::Instant::now();
        let snapshot = rates.refresh_rates(t(0)).await;
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(snapshot.source, RateSource::Fallback);
        assert!((snapshot.exchange_rate - 110.0).abs() < 1e-12);
        assert!((snapshot.instance_hourly - 0.0836 * 110.0).abs() < 1e-9);
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }
}
