use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::cost::SessionCostReport;

/// Result of one status ping against the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPing {
    pub players_online: u32,
    pub players_max: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Whether the game server answered the ping
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<ServerPing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionCostReport>,
    pub currency: String,
}

/// Why a stop sequence was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    Idle,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual request"),
            Self::Idle => write!(f, "no players online"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// Object name of the uploaded archive
    Stored(String),
    Failed(String),
    Disabled,
}

/// Everything the stop sequence produced, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReport {
    pub reason: StopReason,
    pub stopped_at: DateTime<Utc>,
    pub backup: BackupOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionCostReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month_to_date: Option<f64>,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped(StopReport),
    /// Another stop sequence held the slot
    AlreadyInProgress,
    AlreadyStopped,
}
