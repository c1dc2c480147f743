use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Stopped,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Instance state resolved once at the cloud boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub status: InstanceStatus,
    /// Public address, present only while the instance has an external IP
    pub address: Option<String>,
    /// When the instance last transitioned to running
    pub started_at: Option<DateTime<Utc>>,
}

impl InstanceState {
    pub fn stopped() -> Self {
        Self {
            status: InstanceStatus::Stopped,
            address: None,
            started_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// Address of a running instance, `None` when there is nothing to probe.
    pub fn probe_address(&self) -> Option<&str> {
        if self.is_running() {
            self.address.as_deref()
        } else {
            None
        }
    }
}
