//! Summary view
//!
//! The per-kind report handed back from dry-run and apply: resolved ids,
//! resolved names, label associations, plus the env and secret references
//! the package still needs.

use serde::{Deserialize, Serialize};

use crate::ids::PlatformId;
use crate::kind::ResourceType;
use crate::platform::EndpointPayload;
use crate::resources::{Chart, CheckSpec, Status, StatusRule, TagRule, VariableArgs};
use crate::state::StateStatus;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub buckets: Vec<BucketSummary>,
    pub checks: Vec<CheckSummary>,
    pub dashboards: Vec<DashboardSummary>,
    pub labels: Vec<LabelSummary>,
    pub notification_endpoints: Vec<EndpointSummary>,
    pub notification_rules: Vec<RuleSummary>,
    pub tasks: Vec<TaskSummary>,
    pub telegraf_configs: Vec<TelegrafSummary>,
    pub variables: Vec<VariableSummary>,
    pub label_mappings: Vec<LabelMappingSummary>,
    /// Env keys the caller has not supplied values for.
    pub missing_envs: Vec<String>,
    /// Secret keys neither present on the platform nor supplied by the
    /// caller.
    pub missing_secrets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub retention_seconds: Option<u64>,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub every_seconds: u64,
    pub offset_seconds: u64,
    pub query: String,
    pub spec: CheckSpec,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub charts: Vec<Chart>,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub spec: EndpointPayload,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub name: String,
    pub endpoint_id: PlatformId,
    pub endpoint_pkg_name: String,
    pub endpoint_type: String,
    pub description: String,
    pub status: Status,
    pub every_seconds: u64,
    pub offset_seconds: u64,
    pub message_template: String,
    pub status_rules: Vec<StatusRule>,
    pub tag_rules: Vec<TagRule>,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub query: String,
    pub every_seconds: Option<u64>,
    pub offset_seconds: u64,
    pub cron: Option<String>,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegrafSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub config: String,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSummary {
    pub pkg_name: String,
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: String,
    pub arguments: VariableArgs,
    pub label_associations: Vec<LabelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMappingSummary {
    pub status: StateStatus,
    pub resource_id: PlatformId,
    pub resource_type: ResourceType,
    pub resource_pkg_name: String,
    pub resource_name: String,
    pub label_id: PlatformId,
    pub label_pkg_name: String,
    pub label_name: String,
}
