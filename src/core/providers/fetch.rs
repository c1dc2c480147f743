use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default per-request ceiling for calls that do not set their own timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared HTTP client used by every collaborator.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(concat!("serverkeeper/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Validate that a resolved endpoint URL uses HTTPS.
///
/// Anything that receives a bearer token or webhook secret must call this
/// first, to prevent leaking credentials over plain HTTP or other schemes.
pub fn validate_endpoint(url: &str, service_name: &str) -> Result<()> {
    if !url.starts_with("https://") {
        anyhow::bail!("{}: endpoint must use HTTPS, got: {}", service_name, url);
    }
    Ok(())
}

/// Send a request, reject non-2xx responses with their body, and decode JSON.
pub async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    what: &str,
) -> Result<T> {
    let response = request
        .header("Accept", "application/json")
        .send()
        .await
        .with_context(|| format!("Failed to send request to {}", what))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        anyhow::bail!("{} rejected credentials (HTTP {})", what, status.as_u16());
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {} from {}: {}", status.as_u16(), what, truncate(&body, 300));
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse {} response", what))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}…", cut)
}
