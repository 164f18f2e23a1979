//! Status condition type shared by `ClusterBundle` and the legacy `Bundle`

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single status condition, keyed by `type_` within `status.conditions`
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (`Synced`, `Migrated`, `Deprecated`)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (`True`, `False`, `Unknown`)
    pub status: String,

    /// Last transition time; preserved across reconciles unless `status` changes
    pub last_transition_time: DateTime<Utc>,

    /// Machine-readable reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn synced_true() -> Self {
        Self {
            type_: "Synced".to_string(),
            status: "True".to_string(),
            last_transition_time: Utc::now(),
            reason: Some("Synced".to_string()),
            message: Some("Bundle reconciled successfully".to_string()),
        }
    }

    pub fn synced_false(reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: "Synced".to_string(),
            status: "False".to_string(),
            last_transition_time: Utc::now(),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    /// Merge `next` into `conditions`, preserving `last_transition_time` from
    /// the previous entry of the same `type_` when `status` is unchanged.
    pub fn upsert(conditions: &mut Vec<Condition>, mut next: Condition) {
        if let Some(existing) = conditions.iter().find(|c| c.type_ == next.type_) {
            if existing.status == next.status {
                next.last_transition_time = existing.last_transition_time;
            }
        }
        conditions.retain(|c| c.type_ != next.type_);
        conditions.push(next);
    }
}
