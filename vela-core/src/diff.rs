//! Diff view
//!
//! Per-resource old/new comparison produced by dry-run: what would be
//! created, updated or removed if the package were applied. Entries are
//! sorted by pkg-name within each kind; label mappings sort by
//! (resource-type, resource-pkg-name, label-name).

use serde::{Deserialize, Serialize};

use crate::ids::PlatformId;
use crate::kind::ResourceType;
use crate::platform::EndpointPayload;
use crate::resources::{Chart, CheckSpec, Status, StatusRule, TagRule, VariableArgs};
use crate::state::StateStatus;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diff {
    pub buckets: Vec<BucketDiff>,
    pub checks: Vec<CheckDiff>,
    pub dashboards: Vec<DashboardDiff>,
    pub labels: Vec<LabelDiff>,
    pub notification_endpoints: Vec<EndpointDiff>,
    pub notification_rules: Vec<RuleDiff>,
    pub tasks: Vec<TaskDiff>,
    pub telegraf_configs: Vec<TelegrafDiff>,
    pub variables: Vec<VariableDiff>,
    pub label_mappings: Vec<LabelMappingDiff>,
}

/// Identity shared by every per-resource diff entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffIdentifier {
    pub id: PlatformId,
    pub pkg_name: String,
    pub status: StateStatus,
}

impl DiffIdentifier {
    pub fn will_remove(&self) -> bool {
        self.status == StateStatus::Remove
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<BucketDiffValues>,
    pub new: BucketDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDiffValues {
    pub name: String,
    pub description: String,
    pub retention_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<LabelDiffValues>,
    pub new: LabelDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDiffValues {
    pub name: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<CheckDiffValues>,
    pub new: CheckDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDiffValues {
    pub name: String,
    pub description: String,
    pub status: Status,
    pub every_seconds: u64,
    pub offset_seconds: u64,
    pub query: String,
    pub spec: CheckSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<DashboardDiffValues>,
    pub new: DashboardDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDiffValues {
    pub name: String,
    pub description: String,
    pub charts: Vec<Chart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<EndpointDiffValues>,
    pub new: EndpointDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDiffValues {
    pub name: String,
    pub description: String,
    pub status: Status,
    pub spec: EndpointPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<RuleDiffValues>,
    pub new: RuleDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDiffValues {
    pub name: String,
    pub description: String,
    pub endpoint_name: String,
    pub endpoint_id: PlatformId,
    pub every_seconds: u64,
    pub offset_seconds: u64,
    pub message_template: String,
    pub status_rules: Vec<StatusRule>,
    pub tag_rules: Vec<TagRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<TaskDiffValues>,
    pub new: TaskDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDiffValues {
    pub name: String,
    pub description: String,
    pub status: Status,
    pub query: String,
    pub every_seconds: Option<u64>,
    pub offset_seconds: u64,
    pub cron: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegrafDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<TelegrafDiffValues>,
    pub new: TelegrafDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegrafDiffValues {
    pub name: String,
    pub description: String,
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDiff {
    pub identifier: DiffIdentifier,
    pub old: Option<VariableDiffValues>,
    pub new: VariableDiffValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDiffValues {
    pub name: String,
    pub description: String,
    pub arguments: VariableArgs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMappingDiff {
    pub status: StateStatus,
    pub resource_type: ResourceType,
    pub resource_id: PlatformId,
    pub resource_pkg_name: String,
    pub resource_name: String,
    pub label_id: PlatformId,
    pub label_pkg_name: String,
    pub label_name: String,
}
