use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::core::process;

/// gcloud tokens live for an hour; refresh well before that.
const TOKEN_TTL: Duration = Duration::from_secs(45 * 60);
const GCLOUD_TIMEOUT: Duration = Duration::from_secs(20);

/// Supplies OAuth access tokens for the Google Cloud REST APIs.
///
/// `SK_ACCESS_TOKEN` wins when set. Otherwise the token is minted with
/// `gcloud auth print-access-token` and cached in memory.
#[derive(Debug, Default)]
pub struct AccessTokenSource {
    cached: Mutex<Option<(String, Instant)>>,
}

impl AccessTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn token(&self) -> Result<String> {
        if let Some(token) = env_token() {
            return Ok(token);
        }

        let mut cached = self.cached.lock().await;
        if let Some((token, minted)) = cached.as_ref() {
            if minted.elapsed() < TOKEN_TTL {
                return Ok(token.clone());
            }
        }

        process::require("gcloud", "Google Cloud credentials; or set SK_ACCESS_TOKEN")?;
        let token = process::run_command("gcloud", &["auth", "print-access-token"], GCLOUD_TIMEOUT)
            .await
            .context("Failed to mint access token with gcloud")?;
        if token.is_empty() {
            anyhow::bail!("gcloud returned an empty access token");
        }

        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

fn env_token() -> Option<String> {
    std::env::var("SK_ACCESS_TOKEN")
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
