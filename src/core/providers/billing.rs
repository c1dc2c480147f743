use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::core::auth::AccessTokenSource;
use crate::core::error::{chain, KeeperError};
use crate::core::models::cost::BillingLineItem;
use crate::core::providers::fetch::send_json;
use crate::core::providers::BillingService;

const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const QUERY_TIMEOUT_MS: u64 = 30_000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    v: Option<serde_json::Value>,
}

impl Cell {
    fn as_str(&self) -> Option<&str> {
        self.v.as_ref()?.as_str()
    }
}

/// Table names cannot be query parameters, so only accept plain identifiers.
fn validate_table(table: &str) -> Result<()> {
    let parts: Vec<&str> = table.split('.').collect();
    let valid = parts.len() == 3
        && parts.iter().all(|p| {
            !p.is_empty()
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
    if !valid {
        anyhow::bail!("Billing export table must look like project.dataset.table, got '{}'", table);
    }
    Ok(())
}

fn build_query(table: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> serde_json::Value {
    let sql = format!(
        "SELECT service.description AS service, SUM(cost) AS cost \
         FROM `{}` \
         WHERE usage_start_time >= @start AND usage_start_time < @end \
         GROUP BY service ORDER BY cost DESC",
        table
    );
    let timestamp = |name: &str, at: DateTime<Utc>| {
        json!({
            "name": name,
            "parameterType": { "type": "TIMESTAMP" },
            "parameterValue": { "value": at.to_rfc3339_opts(SecondsFormat::Secs, true) }
        })
    };
    json!({
        "query": sql,
        "useLegacySql": false,
        "parameterMode": "NAMED",
        "queryParameters": [timestamp("start", start), timestamp("end", end)],
        "timeoutMs": QUERY_TIMEOUT_MS,
    })
}

fn parse_rows(response: QueryResponse) -> Result<Vec<BillingLineItem>> {
    if !response.job_complete {
        anyhow::bail!("Billing query did not finish within {}ms", QUERY_TIMEOUT_MS);
    }
    response
        .rows
        .iter()
        .map(|row| {
            let service = row
                .f
                .first()
                .and_then(Cell::as_str)
                .unwrap_or("Unknown")
                .to_string();
            let cost_usd = row
                .f
                .get(1)
                .and_then(Cell::as_str)
                .context("Billing row missing cost")?
                .parse::<f64>()
                .context("Billing row cost is not a number")?;
            Ok(BillingLineItem { service, cost_usd })
        })
        .collect()
}

/// Month-to-date spend from the BigQuery billing export.
pub struct BigQueryBilling {
    client: reqwest::Client,
    tokens: Arc<AccessTokenSource>,
    project: String,
    table: Option<String>,
}

impl BigQueryBilling {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<AccessTokenSource>,
        project: &str,
        table: Option<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            project: project.to_string(),
            table,
        }
    }

    async fn query(&self, table: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<BillingLineItem>> {
        validate_table(table)?;
        let token = self.tokens.token().await?;
        let response: QueryResponse = send_json(
            self.client
                .post(format!("{}/projects/{}/queries", BIGQUERY_API, self.project))
                .bearer_auth(token)
                .json(&build_query(table, start, end)),
            "BigQuery jobs.query",
        )
        .await?;
        parse_rows(response)
    }
}

#[async_trait]
impl BillingService for BigQueryBilling {
    async fn month_to_date(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BillingLineItem>, KeeperError> {
        let table = self.table.as_deref().ok_or_else(|| {
            KeeperError::BillingUnavailable("no billing export table configured".to_string())
        })?;
        self.query(table, start, end)
            .await
            .map_err(|e| KeeperError::BillingUnavailable(chain(&e)))
    }
}
