use thiserror::Error;

/// Failures surfaced by the lifecycle collaborators and the cost engine.
///
/// Collaborators work with `anyhow` internally and collapse the error chain
/// into one of these variants at the trait boundary, so callers can decide
/// between "skip this tick", "fall back", and "tell the user".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeeperError {
    #[error("Instance operation failed: {0}")]
    Provision(String),
    #[error("Instance query failed: {0}")]
    Query(String),
    #[error("Game server unreachable: {0}")]
    Unreachable(String),
    #[error("Backup failed: {0}")]
    Backup(String),
    #[error("Pricing unavailable: {0}")]
    PriceUnavailable(String),
    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),
    #[error("Billing report unavailable: {0}")]
    BillingUnavailable(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl KeeperError {
    /// Network hiccups that the scheduler skips and retries next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Query(_) | Self::Unreachable(_))
    }

    /// Upstream services that have a cached or static fallback.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::PriceUnavailable(_) | Self::RateUnavailable(_) | Self::BillingUnavailable(_)
        )
    }
}

/// Render an `anyhow` chain on one line (`outer: inner: root`).
pub fn chain(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
