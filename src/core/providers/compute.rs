use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::auth::AccessTokenSource;
use crate::core::config::InstanceConfig;
use crate::core::error::{chain, KeeperError};
use crate::core::models::instance::{InstanceState, InstanceStatus};
use crate::core::providers::fetch::send_json;
use crate::core::providers::InstanceLifecycle;

const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";

/// The `operations/{name}/wait` call returns after at most ~2 minutes.
const OPERATION_WAIT_TIMEOUT: Duration = Duration::from_secs(150);
const MAX_OPERATION_WAITS: usize = 8;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceResource {
    status: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
    last_start_timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Deserialize)]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    status: String,
    error: Option<OperationErrors>,
}

#[derive(Deserialize)]
struct OperationErrors {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Deserialize)]
struct OperationErrorItem {
    code: String,
    message: Option<String>,
}

/// Map the raw instance resource onto the tagged state used everywhere else.
///
/// Only `RUNNING` counts as running; staging, stopping, suspended and
/// terminated instances have no game server to talk to.
fn resolve_state(resource: InstanceResource) -> InstanceState {
    if resource.status != "RUNNING" {
        return InstanceState::stopped();
    }
    let address = resource
        .network_interfaces
        .iter()
        .flat_map(|nic| nic.access_configs.iter())
        .find_map(|ac| ac.nat_ip.clone())
        .filter(|ip| !ip.is_empty());
    let started_at = resource
        .last_start_timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc));

    InstanceState {
        status: InstanceStatus::Running,
        address,
        started_at,
    }
}

fn operation_error(op: &Operation) -> Option<String> {
    let errors = op.error.as_ref()?;
    if errors.errors.is_empty() {
        return None;
    }
    Some(
        errors
            .errors
            .iter()
            .map(|e| match &e.message {
                Some(msg) => format!("{}: {}", e.code, msg),
                None => e.code.clone(),
            })
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// A single Compute Engine VM addressed by project, zone and name.
pub struct GceInstance {
    client: reqwest::Client,
    tokens: Arc<AccessTokenSource>,
    project: String,
    zone: String,
    name: String,
    query_timeout: Duration,
}

impl GceInstance {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<AccessTokenSource>,
        config: &InstanceConfig,
        query_timeout: Duration,
    ) -> Self {
        Self {
            client,
            tokens,
            project: config.project.clone(),
            zone: config.zone.clone(),
            name: config.name.clone(),
            query_timeout,
        }
    }

    fn zone_url(&self) -> String {
        format!("{}/projects/{}/zones/{}", COMPUTE_API, self.project, self.zone)
    }

    fn instance_url(&self) -> String {
        format!("{}/instances/{}", self.zone_url(), self.name)
    }

    async fn fetch_state(&self) -> Result<InstanceState> {
        let token = self.tokens.token().await?;
        let resource: InstanceResource = send_json(
            self.client
                .get(self.instance_url())
                .bearer_auth(token)
                .timeout(self.query_timeout),
            "Compute Engine instances.get",
        )
        .await?;
        Ok(resolve_state(resource))
    }

    /// Issue `instances.{verb}` and block until the zone operation is done.
    async fn run_operation(&self, verb: &str) -> Result<()> {
        let token = self.tokens.token().await?;
        let mut op: Operation = send_json(
            self.client
                .post(format!("{}/{}", self.instance_url(), verb))
                .bearer_auth(&token),
            &format!("Compute Engine instances.{}", verb),
        )
        .await?;
        debug!(instance = %self.name, operation = %op.name, verb, "operation submitted");

        let mut waits = 0;
        while op.status != "DONE" {
            if waits >= MAX_OPERATION_WAITS {
                anyhow::bail!("operation {} still {} after waiting", op.name, op.status);
            }
            waits += 1;
            let token = self.tokens.token().await?;
            op = send_json(
                self.client
                    .post(format!("{}/operations/{}/wait", self.zone_url(), op.name))
                    .bearer_auth(token)
                    .timeout(OPERATION_WAIT_TIMEOUT),
                "Compute Engine zoneOperations.wait",
            )
            .await?;
        }

        if let Some(err) = operation_error(&op) {
            anyhow::bail!("{} failed: {}", verb, err);
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceLifecycle for GceInstance {
    async fn start(&self) -> Result<String, KeeperError> {
        let result: Result<String> = async {
            self.run_operation("start").await?;
            let state = self.fetch_state().await?;
            let address = state
                .address
                .context("instance started but has no external address")?;
            info!(instance = %self.name, %address, "instance started");
            Ok(address)
        }
        .await;
        result.map_err(|e| KeeperError::Provision(chain(&e)))
    }

    async fn stop(&self) -> Result<(), KeeperError> {
        self.run_operation("stop")
            .await
            .map_err(|e| KeeperError::Provision(chain(&e)))?;
        info!(instance = %self.name, "instance stopped");
        Ok(())
    }

    async fn status(&self) -> Result<InstanceState, KeeperError> {
        self.fetch_state()
            .await
            .map_err(|e| KeeperError::Query(chain(&e)))
    }

    /// Mint (or reuse) the access token so `status` only pays for the API call.
    async fn prepare(&self) -> Result<(), KeeperError> {
        self.tokens
            .token()
            .await
            .map(|_| ())
            .map_err(|e| KeeperError::Query(chain(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn running_instance_resolves_address_and_start_time() {
        let json = r#"{
            "name": "minecraft",
            "status": "RUNNING",
            "lastStartTimestamp": "2026-10-18T03:15:00.123-07:00",
            "networkInterfaces": [
                { "networkIP": "10.146.0.2",
                  "accessConfigs": [ { "type": "ONE_TO_ONE_NAT", "natIP": "34.84.10.20" } ] }
            ]
        }"#;
        let resource: InstanceResource = serde_json::from_str(json).unwrap();
        let state = resolve_state(resource);
        assert_eq!(state.status, InstanceStatus::Running);
        assert_eq!(state.address.as_deref(), Some("34.84.10.20"));
        let expected = Utc.with_ymd_and_hms(2026, 10, 18, 10, 15, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(state.started_at, Some(expected));
    }

    #[test]
    fn terminated_instance_is_stopped_without_address() {
        let json = r#"{
            "status": "TERMINATED",
            "networkInterfaces": [ { "accessConfigs": [ { "type": "ONE_TO_ONE_NAT" } ] } ]
        }"#;
        let state = resolve_state(serde_json::from_str(json).unwrap());
        assert_eq!(state.status, InstanceStatus::Stopped);
        assert_eq!(state.address, None);
        assert_eq!(state.started_at, None);
        assert_eq!(state.probe_address(), None);
    }

    #[test]
    fn transitional_states_count_as_stopped() {
        for status in ["STAGING", "PROVISIONING", "STOPPING", "SUSPENDED"] {
            let json = format!(r#"{{ "status": "{}" }}"#, status);
            let state = resolve_state(serde_json::from_str(&json).unwrap());
            assert!(!state.is_running(), "{} should not be running", status);
        }
    }

    #[test]
    fn operation_errors_are_joined() {
        let json = r#"{
            "name": "operation-123",
            "status": "DONE",
            "error": { "errors": [
                { "code": "ZONE_RESOURCE_POOL_EXHAUSTED", "message": "no capacity" },
                { "code": "QUOTA_EXCEEDED" }
            ] }
        }"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert_eq!(
            operation_error(&op).as_deref(),
            Some("ZONE_RESOURCE_POOL_EXHAUSTED: no capacity; QUOTA_EXCEEDED")
        );
    }

    #[test]
    fn successful_operation_has_no_error() {
        let op: Operation =
            serde_json::from_str(r#"{ "name": "operation-1", "status": "DONE" }"#).unwrap();
        assert_eq!(operation_error(&op), None);
    }

    #[test]
    fn urls_follow_project_zone_name() {
        let instance = GceInstance::new(
            reqwest::Client::new(),
            Arc::new(AccessTokenSource::new()),
            &InstanceConfig {
                project: "craft-123".into(),
                zone: "asia-northeast1-b".into(),
                name: "mc".into(),
            },
            Duration::from_secs(5),
        );
        assert_eq!(
            instance.instance_url(),
            "https://compute.googleapis.com/compute/v1/projects/craft-123/zones/asia-northeast1-b/instances/mc"
        );
    }
}
