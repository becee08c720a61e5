//! Platform-side resource representations
//!
//! What the resource services return and accept. These are the "current
//! truth" counterparts to the parsed bodies in [`crate::resources`]; dry-run
//! attaches them to state records as `existing`, and rollback restores from
//! them.

use serde::{Deserialize, Serialize};

use crate::ids::PlatformId;
use crate::resources::{CheckSpec, Status, StatusRule, TagRule, VariableArgs};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub retention_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct BucketUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub retention_seconds: Option<Option<u64>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Label {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct LabelUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

/// An edge between a label and a labeled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMappingRecord {
    pub label_id: PlatformId,
    pub resource_id: PlatformId,
    pub resource_type: crate::ResourceType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cells: Option<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: PlatformId,
    pub org_id: PlatformId,
    /// Backing task executing the check query; system-owned.
    pub task_id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub query: String,
    pub every_seconds: u64,
    pub offset_seconds: u64,
    pub status_message_template: String,
    pub spec: CheckSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEndpoint {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub spec: EndpointPayload,
}

/// Variant payload of a platform endpoint. Secret-bearing fields hold the
/// secret-store keys, never values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointPayload {
    Http {
        method: String,
        url: String,
        username_secret: Option<String>,
        password_secret: Option<String>,
        token_secret: Option<String>,
    },
    PagerDuty {
        client_url: String,
        routing_key_secret: String,
    },
    Slack {
        url: String,
        token_secret: String,
    },
}

impl NotificationEndpoint {
    /// Secret-store keys referenced by this endpoint, in field order.
    pub fn secret_fields(&self) -> Vec<(&'static str, String)> {
        match &self.spec {
            EndpointPayload::Http {
                username_secret,
                password_secret,
                token_secret,
                ..
            } => {
                let mut fields = Vec::new();
                if let Some(k) = username_secret {
                    fields.push(("username", k.clone()));
                }
                if let Some(k) = password_secret {
                    fields.push(("password", k.clone()));
                }
                if let Some(k) = token_secret {
                    fields.push(("token", k.clone()));
                }
                fields
            }
            EndpointPayload::PagerDuty {
                routing_key_secret, ..
            } => vec![("routing-key", routing_key_secret.clone())],
            EndpointPayload::Slack { token_secret, .. } => {
                vec![("token", token_secret.clone())]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: PlatformId,
    pub org_id: PlatformId,
    /// Backing task executing the rule; system-owned.
    pub task_id: PlatformId,
    pub endpoint_id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub every_seconds: u64,
    pub offset_seconds: u64,
    pub message_template: String,
    pub status_rules: Vec<StatusRule>,
    pub tag_rules: Vec<TagRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub query: String,
    pub every_seconds: Option<u64>,
    pub offset_seconds: u64,
    pub cron: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub query: Option<String>,
    pub every_seconds: Option<Option<u64>>,
    pub offset_seconds: Option<u64>,
    pub cron: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegrafConfig {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub arguments: VariableArgs,
}

#[derive(Debug, Clone, Default)]
pub struct VariableUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub arguments: Option<VariableArgs>,
}
