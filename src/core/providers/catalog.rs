use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::core::auth::AccessTokenSource;
use crate::core::config::RatesConfig;
use crate::core::cost::pricing::{hourly_from_catalog, CatalogPrices};
use crate::core::error::{chain, KeeperError};
use crate::core::models::rates::HourlyRates;
use crate::core::providers::fetch::send_json;
use crate::core::providers::PricingService;

/// Cloud Billing Catalog service id for Compute Engine.
const COMPUTE_SERVICE: &str = "services/6F81-5844-456A";
const CATALOG_API: &str = "https://cloudbilling.googleapis.com/v1";
const MAX_PAGES: usize = 20;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkuPage {
    #[serde(default)]
    skus: Vec<Sku>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sku {
    description: String,
    category: SkuCategory,
    #[serde(default)]
    service_regions: Vec<String>,
    #[serde(default)]
    pricing_info: Vec<PricingInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkuCategory {
    usage_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingInfo {
    pricing_expression: PricingExpression,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingExpression {
    #[serde(default)]
    tiered_rates: Vec<TieredRate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TieredRate {
    #[serde(default)]
    start_usage_amount: f64,
    unit_price: Money,
}

/// `google.type.Money`; `units` is an int64 and arrives as a JSON string.
#[derive(Deserialize)]
struct Money {
    units: Option<String>,
    nanos: Option<i64>,
}

impl Money {
    fn as_f64(&self) -> f64 {
        let units = self
            .units
            .as_deref()
            .and_then(|u| u.parse::<i64>().ok())
            .unwrap_or(0);
        units as f64 + self.nanos.unwrap_or(0) as f64 * 1e-9
    }
}

impl Sku {
    /// Price of the base tier, in USD per usage unit.
    fn base_price(&self) -> Option<f64> {
        let rates = &self.pricing_info.first()?.pricing_expression.tiered_rates;
        rates
            .iter()
            .find(|r| r.start_usage_amount == 0.0)
            .or_else(|| rates.first())
            .map(|r| r.unit_price.as_f64())
    }

    fn serves(&self, region: &str) -> bool {
        self.service_regions.iter().any(|r| r == region)
    }
}

/// Accumulates the three prices we need while paging through the catalog.
#[derive(Default)]
struct PriceMatcher {
    core: Option<f64>,
    ram: Option<f64>,
    pd: Option<f64>,
}

impl PriceMatcher {
    fn observe(&mut self, sku: &Sku, config: &RatesConfig) {
        if !sku.serves(&config.region) {
            return;
        }
        let desc = sku.description.as_str();
        if ["Custom", "Sole Tenancy", "Commitment", "Extended"]
            .iter()
            .any(|skip| desc.contains(skip))
        {
            return;
        }

        let wanted_usage = if config.spot { "Preemptible" } else { "OnDemand" };
        let core_name = format!("{} Instance Core", config.machine_series);
        let ram_name = format!("{} Instance Ram", config.machine_series);

        if sku.category.usage_type == wanted_usage {
            if self.core.is_none() && desc.contains(&core_name) {
                self.core = sku.base_price();
            } else if self.ram.is_none() && desc.contains(&ram_name) {
                self.ram = sku.base_price();
            }
        }
        if self.pd.is_none()
            && sku.category.usage_type == "OnDemand"
            && desc.starts_with("Storage PD Capacity")
        {
            self.pd = sku.base_price();
        }
    }

    fn is_complete(&self) -> bool {
        self.core.is_some() && self.ram.is_some() && self.pd.is_some()
    }

    fn finish(self) -> Result<CatalogPrices> {
        Ok(CatalogPrices {
            core_hourly: self.core.context("No matching instance core SKU")?,
            ram_gb_hourly: self.ram.context("No matching instance RAM SKU")?,
            pd_gb_monthly: self.pd.context("No matching persistent disk SKU")?,
        })
    }
}

/// Live instance and disk prices from the Cloud Billing Catalog API.
pub struct CatalogPricing {
    client: reqwest::Client,
    tokens: Arc<AccessTokenSource>,
    config: RatesConfig,
}

impl CatalogPricing {
    pub fn new(client: reqwest::Client, tokens: Arc<AccessTokenSource>, config: RatesConfig) -> Self {
        Self {
            client,
            tokens,
            config,
        }
    }

    async fn fetch_prices(&self) -> Result<CatalogPrices> {
        let token = self.tokens.token().await?;
        let url = format!("{}/{}/skus", CATALOG_API, COMPUTE_SERVICE);
        let mut matcher = PriceMatcher::default();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(&[("pageSize", "5000"), ("currencyCode", "USD")]);
            if let Some(t) = &page_token {
                request = request.query(&[("pageToken", t.as_str())]);
            }
            let data: SkuPage = send_json(request, "Cloud Billing Catalog").await?;
            for sku in &data.skus {
                matcher.observe(sku, &self.config);
            }
            debug!(page, skus = data.skus.len(), "catalog page scanned");

            if matcher.is_complete() {
                break;
            }
            match data.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        matcher.finish()
    }
}

#[async_trait]
impl PricingService for CatalogPricing {
    async fn hourly_rates(&self) -> Result<HourlyRates, KeeperError> {
        let prices = self
            .fetch_prices()
            .await
            .map_err(|e| KeeperError::PriceUnavailable(chain(&e)))?;
        Ok(hourly_from_catalog(
            &prices,
            self.config.vcpus,
            self.config.memory_gb,
            self.config.disk_gb,
        ))
    }
}
