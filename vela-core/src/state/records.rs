//! Per-kind state records
//!
//! One record exists per (kind, pkg-name) the reconciliation touches. A
//! record is born `New` from the package, may be promoted to `Exists` by
//! stack reconciliation or dry-run discovery, or injected as a synthetic
//! `Remove` for stack entries the package no longer declares.

use serde::{Deserialize, Serialize};

use crate::diff::{
    BucketDiff, BucketDiffValues, CheckDiff, CheckDiffValues, DashboardDiff, DashboardDiffValues,
    DiffIdentifier, EndpointDiff, EndpointDiffValues, LabelDiff, LabelDiffValues, RuleDiff,
    RuleDiffValues, TaskDiff, TaskDiffValues, TelegrafDiff, TelegrafDiffValues, VariableDiff,
    VariableDiffValues,
};
use crate::ids::PlatformId;
use crate::kind::{Kind, ResourceType};
use crate::package::{Association, Reference};
use crate::platform::{
    Bucket, Cell, Check, Dashboard, EndpointPayload, Label, NotificationEndpoint,
    NotificationRule, Task, TelegrafConfig, Variable,
};
use crate::resources::{
    Chart, EndpointSpec, HttpAuth, ParsedBucket, ParsedCheck, ParsedDashboard, ParsedEndpoint,
    ParsedLabel, ParsedRule, ParsedTask, ParsedTelegraf, ParsedVariable,
};
use crate::summary::{
    BucketSummary, CheckSummary, DashboardSummary, EndpointSummary, LabelSummary, RuleSummary,
    TaskSummary, TelegrafSummary, VariableSummary,
};

/// Lifecycle status of a state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    #[default]
    New,
    Exists,
    Remove,
}

impl StateStatus {
    pub fn is_new(&self) -> bool {
        matches!(self, StateStatus::New)
    }

    pub fn is_exists(&self) -> bool {
        matches!(self, StateStatus::Exists)
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, StateStatus::Remove)
    }
}

/// Identity snapshot of a record, used by the label-mapping planner and the
/// stack rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct StateIdentity {
    pub id: PlatformId,
    pub name: String,
    pub pkg_name: String,
    pub resource_type: ResourceType,
    pub status: StateStatus,
}

impl StateIdentity {
    pub fn exists(&self) -> bool {
        self.status.is_exists()
    }
}

/// Platform entities that carry their own id.
pub trait PlatformRecord {
    fn record_id(&self) -> PlatformId;
}

macro_rules! platform_record {
    ($($ty:ty),* $(,)?) => {
        $(impl PlatformRecord for $ty {
            fn record_id(&self) -> PlatformId {
                self.id
            }
        })*
    };
}

platform_record!(
    Bucket,
    Check,
    Dashboard,
    Label,
    NotificationEndpoint,
    NotificationRule,
    Task,
    TelegrafConfig,
    Variable,
);

/// State of one declared or stack-recorded resource.
#[derive(Debug, Clone)]
pub struct ResourceState<P, E> {
    /// Id assigned by stack reconciliation or a create during apply.
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub status: StateStatus,
    pub parsed: P,
    pub existing: Option<E>,
}

impl<P, E: PlatformRecord> ResourceState<P, E> {
    pub fn new(parsed: P) -> Self {
        Self {
            id: PlatformId::ZERO,
            org_id: PlatformId::ZERO,
            status: StateStatus::New,
            parsed,
            existing: None,
        }
    }

    /// Synthetic record scheduling the deletion of a stack-owned resource.
    pub fn removal(id: PlatformId, parsed: P) -> Self {
        Self {
            id,
            org_id: PlatformId::ZERO,
            status: StateStatus::Remove,
            parsed,
            existing: None,
        }
    }

    /// The effective platform id: the discovered one once the record is
    /// known to the platform, the assigned one otherwise.
    pub fn platform_id(&self) -> PlatformId {
        if !self.status.is_new() {
            if let Some(e) = &self.existing {
                return e.record_id();
            }
        }
        self.id
    }

    /// Promotes the record to `Exists` with the stack-recorded id.
    pub fn attach_stack_id(&mut self, id: PlatformId) {
        self.id = id;
        self.status = StateStatus::Exists;
    }
}

pub type BucketState = ResourceState<ParsedBucket, Bucket>;
pub type CheckState = ResourceState<ParsedCheck, Check>;
pub type DashboardState = ResourceState<ParsedDashboard, Dashboard>;
pub type LabelState = ResourceState<ParsedLabel, Label>;
pub type EndpointState = ResourceState<ParsedEndpoint, NotificationEndpoint>;
pub type TaskState = ResourceState<ParsedTask, Task>;
pub type TelegrafState = ResourceState<ParsedTelegraf, TelegrafConfig>;
pub type VariableState = ResourceState<ParsedVariable, Variable>;

/// Rule records additionally track the endpoint they depend on, restored
/// from the stack or bound during dry-run.
#[derive(Debug, Clone)]
pub struct RuleState {
    pub inner: ResourceState<ParsedRule, NotificationRule>,
    /// pkg-name of the endpoint this rule fires through.
    pub associated_endpoint: Option<String>,
}

impl RuleState {
    pub fn new(parsed: ParsedRule) -> Self {
        Self {
            inner: ResourceState::new(parsed),
            associated_endpoint: None,
        }
    }

    pub fn removal(id: PlatformId, parsed: ParsedRule) -> Self {
        Self {
            inner: ResourceState::removal(id, parsed),
            associated_endpoint: None,
        }
    }

    pub fn platform_id(&self) -> PlatformId {
        self.inner.platform_id()
    }
}

/// Shared capability surface over the per-kind records.
pub(crate) trait StateRecord {
    fn state_identity(&self) -> StateIdentity;
    /// Name references of the record's label associations.
    fn label_refs(&self) -> Vec<&Reference>;
}

fn label_assoc_refs(associations: &[Association]) -> Vec<&Reference> {
    associations
        .iter()
        .filter(|a| a.is_label())
        .map(|a| &a.name)
        .collect()
}

macro_rules! state_record_impl {
    ($alias:ty, $rt:expr) => {
        impl StateRecord for $alias {
            fn state_identity(&self) -> StateIdentity {
                StateIdentity {
                    id: self.platform_id(),
                    name: self.parsed.identity.name(),
                    pkg_name: self.parsed.identity.pkg_name(),
                    resource_type: $rt,
                    status: self.status,
                }
            }

            fn label_refs(&self) -> Vec<&Reference> {
                label_assoc_refs(&self.parsed.associations)
            }
        }
    };
}

state_record_impl!(BucketState, ResourceType::Buckets);
state_record_impl!(CheckState, ResourceType::Checks);
state_record_impl!(DashboardState, ResourceType::Dashboards);
state_record_impl!(EndpointState, ResourceType::NotificationEndpoints);
state_record_impl!(TaskState, ResourceType::Tasks);
state_record_impl!(TelegrafState, ResourceType::Telegrafs);
state_record_impl!(VariableState, ResourceType::Variables);

impl StateRecord for LabelState {
    fn state_identity(&self) -> StateIdentity {
        StateIdentity {
            id: self.platform_id(),
            name: self.parsed.identity.name(),
            pkg_name: self.parsed.identity.pkg_name(),
            resource_type: ResourceType::Labels,
            status: self.status,
        }
    }

    fn label_refs(&self) -> Vec<&Reference> {
        Vec::new()
    }
}

impl StateRecord for RuleState {
    fn state_identity(&self) -> StateIdentity {
        StateIdentity {
            id: self.platform_id(),
            name: self.inner.parsed.identity.name(),
            pkg_name: self.inner.parsed.identity.pkg_name(),
            resource_type: ResourceType::NotificationRules,
            status: self.inner.status,
        }
    }

    fn label_refs(&self) -> Vec<&Reference> {
        label_assoc_refs(&self.inner.parsed.associations)
    }
}

fn identifier(id: PlatformId, pkg_name: String, status: StateStatus) -> DiffIdentifier {
    DiffIdentifier {
        id,
        pkg_name,
        status,
    }
}

impl BucketState {
    pub fn to_platform(&self) -> Bucket {
        Bucket {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            retention_seconds: self.parsed.retention_seconds,
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || self.parsed.retention_seconds != e.retention_seconds
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> BucketSummary {
        BucketSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            retention_seconds: self.parsed.retention_seconds,
            label_associations,
        }
    }

    pub fn diff(&self) -> BucketDiff {
        BucketDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| BucketDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                retention_seconds: e.retention_seconds,
            }),
            new: BucketDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                retention_seconds: self.parsed.retention_seconds,
            },
        }
    }
}

impl LabelState {
    pub fn to_platform(&self) -> Label {
        Label {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            color: self.parsed.color.clone(),
            description: self.parsed.description.clone(),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.color != e.color
                    || self.parsed.description != e.description
            }
        }
    }

    pub fn summarize(&self) -> LabelSummary {
        LabelSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            color: self.parsed.color.clone(),
            description: self.parsed.description.clone(),
        }
    }

    pub fn diff(&self) -> LabelDiff {
        LabelDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| LabelDiffValues {
                name: e.name.clone(),
                color: e.color.clone(),
                description: e.description.clone(),
            }),
            new: LabelDiffValues {
                name: self.parsed.identity.name(),
                color: self.parsed.color.clone(),
                description: self.parsed.description.clone(),
            },
        }
    }
}

fn charts_to_cells(charts: &[Chart]) -> Vec<Cell> {
    charts
        .iter()
        .map(|c| Cell {
            name: c.name.clone(),
            x: c.x_position,
            y: c.y_position,
            w: c.width,
            h: c.height,
        })
        .collect()
}

impl DashboardState {
    pub fn to_platform(&self) -> Dashboard {
        Dashboard {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            cells: charts_to_cells(&self.parsed.charts),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || charts_to_cells(&self.parsed.charts) != e.cells
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> DashboardSummary {
        DashboardSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            charts: self.parsed.charts.clone(),
            label_associations,
        }
    }

    pub fn diff(&self) -> DashboardDiff {
        DashboardDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| DashboardDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                charts: e
                    .cells
                    .iter()
                    .map(|c| Chart {
                        name: c.name.clone(),
                        chart_kind: String::new(),
                        x_position: c.x,
                        y_position: c.y,
                        width: c.w,
                        height: c.h,
                    })
                    .collect(),
            }),
            new: DashboardDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                charts: self.parsed.charts.clone(),
            },
        }
    }
}

impl CheckState {
    pub fn to_platform(&self) -> Check {
        Check {
            id: self.platform_id(),
            org_id: self.org_id,
            task_id: self
                .existing
                .as_ref()
                .map(|e| e.task_id)
                .unwrap_or(PlatformId::ZERO),
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            status: self.parsed.status,
            query: self.parsed.query.clone(),
            every_seconds: self.parsed.every_seconds,
            offset_seconds: self.parsed.offset_seconds,
            status_message_template: self.parsed.status_message_template.clone(),
            spec: self.parsed.spec.clone(),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || self.parsed.status != e.status
                    || self.parsed.query != e.query
                    || self.parsed.every_seconds != e.every_seconds
                    || self.parsed.offset_seconds != e.offset_seconds
                    || self.parsed.status_message_template != e.status_message_template
                    || self.parsed.spec != e.spec
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> CheckSummary {
        CheckSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            status: self.parsed.status,
            every_seconds: self.parsed.every_seconds,
            offset_seconds: self.parsed.offset_seconds,
            query: self.parsed.query.clone(),
            spec: self.parsed.spec.clone(),
            label_associations,
        }
    }

    pub fn diff(&self) -> CheckDiff {
        CheckDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| CheckDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                status: e.status,
                every_seconds: e.every_seconds,
                offset_seconds: e.offset_seconds,
                query: e.query.clone(),
                spec: e.spec.clone(),
            }),
            new: CheckDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                status: self.parsed.status,
                every_seconds: self.parsed.every_seconds,
                offset_seconds: self.parsed.offset_seconds,
                query: self.parsed.query.clone(),
                spec: self.parsed.spec.clone(),
            },
        }
    }
}

/// Converts a parsed endpoint spec into the platform payload. Secret-bearing
/// references contribute their keys; values never pass through here.
pub(crate) fn endpoint_payload(spec: &EndpointSpec) -> EndpointPayload {
    match spec {
        EndpointSpec::Http { method, url, auth } => {
            let (username_secret, password_secret, token_secret) = match auth {
                HttpAuth::None => (None, None, None),
                HttpAuth::Basic { username, password } => {
                    (Some(username.render()), Some(password.render()), None)
                }
                HttpAuth::Bearer { token } => (None, None, Some(token.render())),
            };
            EndpointPayload::Http {
                method: method.clone(),
                url: url.clone(),
                username_secret,
                password_secret,
                token_secret,
            }
        }
        EndpointSpec::PagerDuty {
            client_url,
            routing_key,
        } => EndpointPayload::PagerDuty {
            client_url: client_url.clone(),
            routing_key_secret: routing_key.render(),
        },
        EndpointSpec::Slack { url, token } => EndpointPayload::Slack {
            url: url.clone(),
            token_secret: token.render(),
        },
    }
}

impl EndpointState {
    pub fn to_platform(&self) -> NotificationEndpoint {
        NotificationEndpoint {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            status: self.parsed.status,
            spec: endpoint_payload(&self.parsed.spec),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || self.parsed.status != e.status
                    || endpoint_payload(&self.parsed.spec) != e.spec
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> EndpointSummary {
        EndpointSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            status: self.parsed.status,
            spec: endpoint_payload(&self.parsed.spec),
            label_associations,
        }
    }

    pub fn diff(&self) -> EndpointDiff {
        EndpointDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| EndpointDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                status: e.status,
                spec: e.spec.clone(),
            }),
            new: EndpointDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                status: self.parsed.status,
                spec: endpoint_payload(&self.parsed.spec),
            },
        }
    }

    pub fn endpoint_kind_name(&self) -> &'static str {
        match self.parsed.spec {
            EndpointSpec::Http { .. } => "http",
            EndpointSpec::PagerDuty { .. } => "pagerduty",
            EndpointSpec::Slack { .. } => "slack",
        }
    }
}

impl RuleState {
    /// Builds the platform rule pointed at the given endpoint id.
    pub fn to_platform(&self, endpoint_id: PlatformId) -> NotificationRule {
        let parsed = &self.inner.parsed;
        NotificationRule {
            id: self.platform_id(),
            org_id: self.inner.org_id,
            task_id: self
                .inner
                .existing
                .as_ref()
                .map(|e| e.task_id)
                .unwrap_or(PlatformId::ZERO),
            endpoint_id,
            name: parsed.identity.name(),
            description: parsed.description.clone(),
            status: parsed.status,
            every_seconds: parsed.every_seconds,
            offset_seconds: parsed.offset_seconds,
            message_template: parsed.message_template.clone(),
            status_rules: parsed.status_rules.clone(),
            tag_rules: parsed.tag_rules.clone(),
        }
    }

    pub fn should_apply(&self, endpoint_id: PlatformId) -> bool {
        match &self.inner.existing {
            None => true,
            Some(e) => {
                let parsed = &self.inner.parsed;
                self.inner.status.is_remove()
                    || parsed.identity.name() != e.name
                    || parsed.description != e.description
                    || parsed.status != e.status
                    || parsed.every_seconds != e.every_seconds
                    || parsed.offset_seconds != e.offset_seconds
                    || parsed.message_template != e.message_template
                    || parsed.status_rules != e.status_rules
                    || parsed.tag_rules != e.tag_rules
                    || endpoint_id != e.endpoint_id
            }
        }
    }

    pub fn summarize(
        &self,
        endpoint: Option<&EndpointState>,
        label_associations: Vec<LabelSummary>,
    ) -> RuleSummary {
        let parsed = &self.inner.parsed;
        RuleSummary {
            pkg_name: parsed.identity.pkg_name(),
            id: self.platform_id(),
            name: parsed.identity.name(),
            endpoint_id: endpoint.map(|e| e.platform_id()).unwrap_or(PlatformId::ZERO),
            endpoint_pkg_name: endpoint
                .map(|e| e.parsed.identity.pkg_name())
                .unwrap_or_default(),
            endpoint_type: endpoint
                .map(|e| e.endpoint_kind_name().to_string())
                .unwrap_or_default(),
            description: parsed.description.clone(),
            status: parsed.status,
            every_seconds: parsed.every_seconds,
            offset_seconds: parsed.offset_seconds,
            message_template: parsed.message_template.clone(),
            status_rules: parsed.status_rules.clone(),
            tag_rules: parsed.tag_rules.clone(),
            label_associations,
        }
    }

    pub fn diff(&self, endpoint: Option<&EndpointState>) -> RuleDiff {
        let parsed = &self.inner.parsed;
        RuleDiff {
            identifier: identifier(
                self.platform_id(),
                parsed.identity.pkg_name(),
                self.inner.status,
            ),
            old: self.inner.existing.as_ref().map(|e| RuleDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                endpoint_name: String::new(),
                endpoint_id: e.endpoint_id,
                every_seconds: e.every_seconds,
                offset_seconds: e.offset_seconds,
                message_template: e.message_template.clone(),
                status_rules: e.status_rules.clone(),
                tag_rules: e.tag_rules.clone(),
            }),
            new: RuleDiffValues {
                name: parsed.identity.name(),
                description: parsed.description.clone(),
                endpoint_name: endpoint
                    .map(|e| e.parsed.identity.pkg_name())
                    .unwrap_or_else(|| parsed.endpoint_name.render()),
                endpoint_id: endpoint.map(|e| e.platform_id()).unwrap_or(PlatformId::ZERO),
                every_seconds: parsed.every_seconds,
                offset_seconds: parsed.offset_seconds,
                message_template: parsed.message_template.clone(),
                status_rules: parsed.status_rules.clone(),
                tag_rules: parsed.tag_rules.clone(),
            },
        }
    }

    pub fn endpoint_association(&self) -> Option<crate::stack::StackResourceAssociation> {
        self.associated_endpoint
            .as_ref()
            .map(|pkg_name| crate::stack::StackResourceAssociation {
                kind: Kind::NotificationEndpoint,
                pkg_name: pkg_name.clone(),
            })
    }
}

impl TaskState {
    pub fn to_platform(&self) -> Task {
        Task {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            status: self.parsed.status,
            query: self.parsed.query.clone(),
            every_seconds: self.parsed.every_seconds,
            offset_seconds: self.parsed.offset_seconds,
            cron: self.parsed.cron.clone(),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || self.parsed.status != e.status
                    || self.parsed.query != e.query
                    || self.parsed.every_seconds != e.every_seconds
                    || self.parsed.offset_seconds != e.offset_seconds
                    || self.parsed.cron != e.cron
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> TaskSummary {
        TaskSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            status: self.parsed.status,
            query: self.parsed.query.clone(),
            every_seconds: self.parsed.every_seconds,
            offset_seconds: self.parsed.offset_seconds,
            cron: self.parsed.cron.clone(),
            label_associations,
        }
    }

    pub fn diff(&self) -> TaskDiff {
        TaskDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| TaskDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                status: e.status,
                query: e.query.clone(),
                every_seconds: e.every_seconds,
                offset_seconds: e.offset_seconds,
                cron: e.cron.clone(),
            }),
            new: TaskDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                status: self.parsed.status,
                query: self.parsed.query.clone(),
                every_seconds: self.parsed.every_seconds,
                offset_seconds: self.parsed.offset_seconds,
                cron: self.parsed.cron.clone(),
            },
        }
    }
}

impl TelegrafState {
    pub fn to_platform(&self) -> TelegrafConfig {
        TelegrafConfig {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            config: self.parsed.config.clone(),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || self.parsed.config != e.config
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> TelegrafSummary {
        TelegrafSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            config: self.parsed.config.clone(),
            label_associations,
        }
    }

    pub fn diff(&self) -> TelegrafDiff {
        TelegrafDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| TelegrafDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                config: e.config.clone(),
            }),
            new: TelegrafDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                config: self.parsed.config.clone(),
            },
        }
    }
}

impl VariableState {
    pub fn to_platform(&self) -> Variable {
        Variable {
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            arguments: self.parsed.args.clone(),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(e) => {
                self.status.is_remove()
                    || self.parsed.identity.name() != e.name
                    || self.parsed.description != e.description
                    || self.parsed.args != e.arguments
            }
        }
    }

    pub fn summarize(&self, label_associations: Vec<LabelSummary>) -> VariableSummary {
        VariableSummary {
            pkg_name: self.parsed.identity.pkg_name(),
            id: self.platform_id(),
            org_id: self.org_id,
            name: self.parsed.identity.name(),
            description: self.parsed.description.clone(),
            arguments: self.parsed.args.clone(),
            label_associations,
        }
    }

    pub fn diff(&self) -> VariableDiff {
        VariableDiff {
            identifier: identifier(
                self.platform_id(),
                self.parsed.identity.pkg_name(),
                self.status,
            ),
            old: self.existing.as_ref().map(|e| VariableDiffValues {
                name: e.name.clone(),
                description: e.description.clone(),
                arguments: e.arguments.clone(),
            }),
            new: VariableDiffValues {
                name: self.parsed.identity.name(),
                description: self.parsed.description.clone(),
                arguments: self.parsed.args.clone(),
            },
        }
    }
}

/// A planned label↔resource edge, resolved against live records at
/// summarize and apply time so freshly assigned ids show through.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLabelMapping {
    pub status: StateStatus,
    pub resource_kind: Kind,
    pub resource_pkg_name: String,
    pub label_pkg_name: String,
}

/// A mapping recorded in the prior stack but absent from the new package;
/// ids are pinned from the stack record.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLabelMappingForRemoval {
    pub label_id: PlatformId,
    pub label_pkg_name: String,
    pub resource_id: PlatformId,
    pub resource_pkg_name: String,
    pub resource_type: ResourceType,
}
