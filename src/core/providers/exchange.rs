use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::core::error::{chain, KeeperError};
use crate::core::providers::fetch::send_json;
use crate::core::providers::ExchangeRateProvider;

const EXCHANGE_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";

#[derive(Deserialize)]
struct LatestRatesResponse {
    base: Option<String>,
    rates: HashMap<String, f64>,
}

fn pick_rate(data: &LatestRatesResponse, currency: &str) -> Result<f64> {
    if let Some(base) = &data.base {
        if !base.eq_ignore_ascii_case("USD") {
            anyhow::bail!("Expected USD base rates, got {}", base);
        }
    }
    let rate = *data
        .rates
        .get(&currency.to_uppercase())
        .with_context(|| format!("No {} rate in response", currency))?;
    if !(rate.is_finite() && rate > 0.0) {
        anyhow::bail!("Invalid USD/{} rate: {}", currency, rate);
    }
    Ok(rate)
}

/// USD to local currency from the public exchangerate-api feed.
pub struct HttpExchangeRate {
    client: reqwest::Client,
    currency: String,
}

impl HttpExchangeRate {
    pub fn new(client: reqwest::Client, currency: &str) -> Self {
        Self {
            client,
            currency: currency.to_uppercase(),
        }
    }
}

#[async_trait]
impl ExchangeRateProvider for HttpExchangeRate {
    async fn rate(&self) -> Result<f64, KeeperError> {
        if self.currency == "USD" {
            return Ok(1.0);
        }
        let result: Result<f64> = async {
            let data: LatestRatesResponse =
                send_json(self.client.get(EXCHANGE_URL), "exchange rate API").await?;
            pick_rate(&data, &self.currency)
        }
        .await;
        result.map_err(|e| KeeperError::RateUnavailable(chain(&e)))
    }
}
