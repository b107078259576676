use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Addressable managed object, identified by a caller-chosen ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lifecycle of a command. `Pending` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Success,
    Failure,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Pending => write!(f, "pending"),
            CommandStatus::Success => write!(f, "success"),
            CommandStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Requested state change against an entity.
///
/// `resolved_at` is `None` exactly while `status` is `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub entity_id: String,
    pub desired_state: Map<String, Value>,
    pub status: CommandStatus,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Command {
    /// Builds a freshly issued command: pending, never resolved.
    pub fn pending(
        id: impl Into<String>,
        entity_id: impl Into<String>,
        desired_state: Map<String, Value>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            desired_state,
            status: CommandStatus::Pending,
            issued_at,
            resolved_at: None,
        }
    }
}

/// Kind of report a subscription asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    State,
    Metric,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::State => write!(f, "state"),
            ReportType::Metric => write!(f, "metric"),
        }
    }
}

/// Registration for state or metric reports about an entity.
///
/// `id` is assigned by the repository on insert; whatever the caller sets is
/// overwritten. `metric` is present iff `report_type` is `Metric`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSubscription {
    pub id: u64,
    pub entity_id: String,
    pub report_type: ReportType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ReportSubscription {
    /// Subscription to full state reports for an entity.
    pub fn state(entity_id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            entity_id: entity_id.into(),
            report_type: ReportType::State,
            metric: None,
            is_active: true,
            updated_at,
        }
    }

    /// Subscription to a single named metric for an entity.
    pub fn metric(
        entity_id: impl Into<String>,
        metric: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            entity_id: entity_id.into(),
            report_type: ReportType::Metric,
            metric: Some(metric.into()),
            is_active: true,
            updated_at,
        }
    }

    /// True when `metric` agrees with `report_type`.
    pub fn is_well_formed(&self) -> bool {
        match self.report_type {
            ReportType::State => self.metric.is_none(),
            ReportType::Metric => self.metric.is_some(),
        }
    }
}
