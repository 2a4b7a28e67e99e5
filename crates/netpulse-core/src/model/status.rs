use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::HostId;

/// Reachability state of a host.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HostStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// An `online -> offline` or `offline -> online` change.
///
/// Transient: broadcast to subscribers and the notification dispatcher,
/// never retained by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub host_id: HostId,
    pub from_status: HostStatus,
    pub to_status: HostStatus,
    pub occurred_at: DateTime<Utc>,
}

impl StatusTransition {
    /// Only flips between two confirmed states are worth announcing.
    pub fn is_notifiable(from: HostStatus, to: HostStatus) -> bool {
        matches!(
            (from, to),
            (HostStatus::Online, HostStatus::Offline) | (HostStatus::Offline, HostStatus::Online)
        )
    }
}

/// Payload handed to notifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub host_id: HostId,
    pub host_name: String,
    pub from_status: HostStatus,
    pub to_status: HostStatus,
    pub occurred_at: DateTime<Utc>,
}

impl TransitionNotice {
    pub fn new(transition: &StatusTransition, host_name: impl Into<String>) -> Self {
        Self {
            host_id: transition.host_id.clone(),
            host_name: host_name.into(),
            from_status: transition.from_status,
            to_status: transition.to_status,
            occurred_at: transition.occurred_at,
        }
    }

    /// One-line human summary, e.g. `core-sw is offline (was online)`.
    pub fn summary(&self) -> String {
        format!(
            "{} is {} (was {})",
            self.host_name, self.to_status, self.from_status
        )
    }
}

/// A status-log record: the state a host settled into, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLogEntry {
    pub status: HostStatus,
    pub at: DateTime<Utc>,
}
