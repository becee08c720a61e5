//! State coordination
//!
//! The in-memory reconciliation model. [`StateCoordinator`] merges a parsed
//! package with the prior stack record and (through dry-run) with what
//! currently exists on the platform, then derives the Summary and Diff
//! views from the result.

mod records;

pub use records::{
    BucketState, CheckState, DashboardState, EndpointState, LabelState, PlatformRecord,
    ResourceState, RuleState, StateIdentity, StateLabelMapping, StateLabelMappingForRemoval,
    StateStatus, TaskState, TelegrafState, VariableState,
};
pub(crate) use records::StateRecord;

use std::collections::{BTreeMap, BTreeSet};

use crate::diff::Diff;
use crate::ids::PlatformId;
use crate::kind::Kind;
use crate::package::Package;
use crate::resources::{
    ParsedBucket, ParsedCheck, ParsedDashboard, ParsedEndpoint, ParsedLabel, ParsedRule,
    ParsedTask, ParsedTelegraf, ParsedVariable,
};
use crate::stack::{Stack, StackResource, StackResourceAssociation};
use crate::summary::{LabelSummary, Summary};

/// Reconciliation state for one apply, keyed by pkg-name within each kind.
#[derive(Debug, Clone, Default)]
pub struct StateCoordinator {
    pub buckets: BTreeMap<String, BucketState>,
    pub checks: BTreeMap<String, CheckState>,
    pub dashboards: BTreeMap<String, DashboardState>,
    pub endpoints: BTreeMap<String, EndpointState>,
    pub labels: BTreeMap<String, LabelState>,
    pub rules: BTreeMap<String, RuleState>,
    pub tasks: BTreeMap<String, TaskState>,
    pub telegrafs: BTreeMap<String, TelegrafState>,
    pub variables: BTreeMap<String, VariableState>,

    pub label_mappings: Vec<StateLabelMapping>,
    pub mappings_to_remove: Vec<StateLabelMappingForRemoval>,

    /// Secret keys the package references, marked true once satisfied by the
    /// platform or the caller.
    pub secret_keys: BTreeMap<String, bool>,
    /// Env keys still unresolved after substitution.
    pub missing_envs: Vec<String>,
}

impl StateCoordinator {
    /// Populates per-kind maps from the package; every record starts `New`.
    pub fn new(pkg: &Package) -> Self {
        let mut state = Self {
            secret_keys: pkg.secret_refs(),
            missing_envs: pkg.missing_env_refs(),
            ..Self::default()
        };

        for b in pkg.buckets() {
            state
                .buckets
                .insert(b.identity.pkg_name(), BucketState::new(b.clone()));
        }
        for c in pkg.checks() {
            state
                .checks
                .insert(c.identity.pkg_name(), CheckState::new(c.clone()));
        }
        for d in pkg.dashboards() {
            state
                .dashboards
                .insert(d.identity.pkg_name(), DashboardState::new(d.clone()));
        }
        for e in pkg.notification_endpoints() {
            state
                .endpoints
                .insert(e.identity.pkg_name(), EndpointState::new(e.clone()));
        }
        for l in pkg.labels() {
            state
                .labels
                .insert(l.identity.pkg_name(), LabelState::new(l.clone()));
        }
        for r in pkg.notification_rules() {
            state
                .rules
                .insert(r.identity.pkg_name(), RuleState::new(r.clone()));
        }
        for t in pkg.tasks() {
            state
                .tasks
                .insert(t.identity.pkg_name(), TaskState::new(t.clone()));
        }
        for t in pkg.telegrafs() {
            state
                .telegrafs
                .insert(t.identity.pkg_name(), TelegrafState::new(t.clone()));
        }
        for v in pkg.variables() {
            state
                .variables
                .insert(v.identity.pkg_name(), VariableState::new(v.clone()));
        }

        state
    }

    /// Reconciles the prior stack record into the state in three passes:
    /// resources, label-mapping removals, rule→endpoint edges. Each pass is
    /// independently testable against a bare stack.
    pub fn add_stack_state(&mut self, stack: &Stack) {
        self.reconcile_stack_resources(&stack.resources);
        self.reconcile_label_mappings(&stack.resources);
        self.reconcile_notification_dependencies(&stack.resources);
    }

    fn reconcile_stack_resources(&mut self, stack_resources: &[StackResource]) {
        for r in stack_resources {
            if self.contains(r.kind, &r.pkg_name) {
                self.attach_stack_id(r.kind, &r.pkg_name, r.id);
            } else {
                self.add_removal(r.kind, &r.pkg_name, r.id);
            }
        }
    }

    fn reconcile_label_mappings(&mut self, stack_resources: &[StackResource]) {
        let mut label_ids: BTreeMap<&str, PlatformId> = BTreeMap::new();
        for r in stack_resources {
            if r.kind.is(Kind::Label) {
                label_ids.insert(&r.pkg_name, r.id);
            }
        }

        for r in stack_resources {
            if r.associations.is_empty() {
                continue;
            }

            // associations still declared in state are kept; the remainder
            // recorded in the stack is scheduled for removal
            let mut stack_assocs: BTreeSet<&StackResourceAssociation> = r
                .associations
                .iter()
                .filter(|a| a.kind.is(Kind::Label))
                .collect();

            let keep: Vec<StackResourceAssociation> = self
                .label_associations(r.kind, &r.pkg_name)
                .into_iter()
                .map(|l| StackResourceAssociation {
                    kind: Kind::Label,
                    pkg_name: l.parsed.identity.pkg_name(),
                })
                .collect();
            for assoc in &keep {
                stack_assocs.remove(assoc);
            }

            for gone in stack_assocs {
                self.mappings_to_remove.push(StateLabelMappingForRemoval {
                    label_id: label_ids.get(gone.pkg_name.as_str()).copied().unwrap_or(PlatformId::ZERO),
                    label_pkg_name: gone.pkg_name.clone(),
                    resource_id: r.id,
                    resource_pkg_name: r.pkg_name.clone(),
                    resource_type: r.kind.resource_type(),
                });
            }
        }
    }

    fn reconcile_notification_dependencies(&mut self, stack_resources: &[StackResource]) {
        for r in stack_resources {
            if !r.kind.is(Kind::NotificationRule) {
                continue;
            }
            let endpoint = r
                .associations
                .iter()
                .find(|a| a.kind.is(Kind::NotificationEndpoint));
            if let (Some(rule), Some(assoc)) = (self.rules.get_mut(&r.pkg_name), endpoint) {
                rule.associated_endpoint = Some(assoc.pkg_name.clone());
            }
        }
    }

    pub fn contains(&self, kind: Kind, pkg_name: &str) -> bool {
        self.record(kind, pkg_name).is_some()
    }

    /// The single dispatch point over the per-kind maps.
    pub(crate) fn record(&self, kind: Kind, pkg_name: &str) -> Option<&dyn StateRecord> {
        match kind.family() {
            Kind::Bucket => self.buckets.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::Check => self.checks.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::Dashboard => self.dashboards.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::Label => self.labels.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::NotificationEndpoint => {
                self.endpoints.get(pkg_name).map(|r| r as &dyn StateRecord)
            }
            Kind::NotificationRule => self.rules.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::Task => self.tasks.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::Telegraf => self.telegrafs.get(pkg_name).map(|r| r as &dyn StateRecord),
            Kind::Variable => self.variables.get(pkg_name).map(|r| r as &dyn StateRecord),
            _ => None,
        }
    }

    fn attach_stack_id(&mut self, kind: Kind, pkg_name: &str, id: PlatformId) {
        match kind.family() {
            Kind::Bucket => {
                if let Some(r) = self.buckets.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::Check => {
                if let Some(r) = self.checks.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::Dashboard => {
                if let Some(r) = self.dashboards.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::Label => {
                if let Some(r) = self.labels.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::NotificationEndpoint => {
                if let Some(r) = self.endpoints.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::NotificationRule => {
                if let Some(r) = self.rules.get_mut(pkg_name) {
                    r.inner.attach_stack_id(id);
                }
            }
            Kind::Task => {
                if let Some(r) = self.tasks.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::Telegraf => {
                if let Some(r) = self.telegrafs.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            Kind::Variable => {
                if let Some(r) = self.variables.get_mut(pkg_name) {
                    r.attach_stack_id(id);
                }
            }
            _ => {}
        }
    }

    /// Injects a synthetic record that schedules deletion of a stack-owned
    /// resource absent from the package. Overwrites any record under the
    /// same key.
    fn add_removal(&mut self, kind: Kind, pkg_name: &str, id: PlatformId) {
        match kind.family() {
            Kind::Bucket => {
                self.buckets.insert(
                    pkg_name.to_string(),
                    BucketState::removal(id, ParsedBucket::placeholder(pkg_name)),
                );
            }
            Kind::Check => {
                self.checks.insert(
                    pkg_name.to_string(),
                    CheckState::removal(id, ParsedCheck::placeholder(pkg_name)),
                );
            }
            Kind::Dashboard => {
                self.dashboards.insert(
                    pkg_name.to_string(),
                    DashboardState::removal(id, ParsedDashboard::placeholder(pkg_name)),
                );
            }
            Kind::Label => {
                self.labels.insert(
                    pkg_name.to_string(),
                    LabelState::removal(id, ParsedLabel::placeholder(pkg_name)),
                );
            }
            Kind::NotificationEndpoint => {
                self.endpoints.insert(
                    pkg_name.to_string(),
                    EndpointState::removal(id, ParsedEndpoint::placeholder(pkg_name)),
                );
            }
            Kind::NotificationRule => {
                self.rules.insert(
                    pkg_name.to_string(),
                    RuleState::removal(id, ParsedRule::placeholder(pkg_name)),
                );
            }
            Kind::Task => {
                self.tasks.insert(
                    pkg_name.to_string(),
                    TaskState::removal(id, ParsedTask::placeholder(pkg_name)),
                );
            }
            Kind::Telegraf => {
                self.telegrafs.insert(
                    pkg_name.to_string(),
                    TelegrafState::removal(id, ParsedTelegraf::placeholder(pkg_name)),
                );
            }
            Kind::Variable => {
                self.variables.insert(
                    pkg_name.to_string(),
                    VariableState::removal(id, ParsedVariable::placeholder(pkg_name)),
                );
            }
            _ => {}
        }
    }

    /// State labels associated with the given record, resolved through the
    /// record's declared associations.
    pub fn label_associations(&self, kind: Kind, pkg_name: &str) -> Vec<&LabelState> {
        let Some(record) = self.record(kind, pkg_name) else {
            return Vec::new();
        };
        record
            .label_refs()
            .into_iter()
            .filter_map(|r| self.labels.get(&r.render()))
            .collect()
    }

    fn label_summaries(&self, kind: Kind, pkg_name: &str) -> Vec<LabelSummary> {
        self.label_associations(kind, pkg_name)
            .into_iter()
            .map(|l| l.summarize())
            .collect()
    }

    pub fn get_label(&self, pkg_name: &str) -> Option<&LabelState> {
        self.labels.get(pkg_name)
    }

    pub fn mark_found_secret(&mut self, key: &str) {
        if let Some(found) = self.secret_keys.get_mut(key) {
            *found = true;
        }
    }

    pub fn mark_provided_secrets(&mut self, keys: impl Iterator<Item = impl AsRef<str>>) {
        for key in keys {
            self.mark_found_secret(key.as_ref());
        }
    }

    pub fn missing_secrets(&self) -> Vec<String> {
        self.secret_keys
            .iter()
            .filter(|(_, found)| !**found)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Summary of everything that persists after the apply: removals are
    /// omitted, mappings carry resolved ids.
    pub fn summary(&self) -> Summary {
        let mut sum = Summary {
            missing_envs: self.missing_envs.clone(),
            missing_secrets: self.missing_secrets(),
            ..Summary::default()
        };

        for (name, b) in &self.buckets {
            if b.status.is_remove() {
                continue;
            }
            sum.buckets
                .push(b.summarize(self.label_summaries(Kind::Bucket, name)));
        }
        for (name, c) in &self.checks {
            if c.status.is_remove() {
                continue;
            }
            sum.checks
                .push(c.summarize(self.label_summaries(Kind::Check, name)));
        }
        for (name, d) in &self.dashboards {
            if d.status.is_remove() {
                continue;
            }
            sum.dashboards
                .push(d.summarize(self.label_summaries(Kind::Dashboard, name)));
        }
        for (_, l) in &self.labels {
            if l.status.is_remove() {
                continue;
            }
            sum.labels.push(l.summarize());
        }
        for (name, e) in &self.endpoints {
            if e.status.is_remove() {
                continue;
            }
            sum.notification_endpoints
                .push(e.summarize(self.label_summaries(Kind::NotificationEndpoint, name)));
        }
        for (name, r) in &self.rules {
            if r.inner.status.is_remove() {
                continue;
            }
            let endpoint = r
                .associated_endpoint
                .as_deref()
                .and_then(|pkg| self.endpoints.get(pkg));
            sum.notification_rules.push(r.summarize(
                endpoint,
                self.label_summaries(Kind::NotificationRule, name),
            ));
        }
        for (name, t) in &self.tasks {
            if t.status.is_remove() {
                continue;
            }
            sum.tasks
                .push(t.summarize(self.label_summaries(Kind::Task, name)));
        }
        for (name, t) in &self.telegrafs {
            if t.status.is_remove() {
                continue;
            }
            sum.telegraf_configs
                .push(t.summarize(self.label_summaries(Kind::Telegraf, name)));
        }
        for (name, v) in &self.variables {
            if v.status.is_remove() {
                continue;
            }
            sum.variables
                .push(v.summarize(self.label_summaries(Kind::Variable, name)));
        }

        for m in &self.label_mappings {
            let Some(ident) = self
                .record(m.resource_kind, &m.resource_pkg_name)
                .map(|r| r.state_identity())
            else {
                continue;
            };
            let Some(label) = self.labels.get(&m.label_pkg_name) else {
                continue;
            };
            sum.label_mappings.push(crate::summary::LabelMappingSummary {
                status: m.status,
                resource_id: ident.id,
                resource_type: ident.resource_type,
                resource_pkg_name: ident.pkg_name,
                resource_name: ident.name,
                label_id: label.platform_id(),
                label_pkg_name: m.label_pkg_name.clone(),
                label_name: label.parsed.identity.name(),
            });
        }
        sum.label_mappings.sort_by(|a, b| {
            (a.resource_type, &a.resource_pkg_name, &a.label_name).cmp(&(
                b.resource_type,
                &b.resource_pkg_name,
                &b.label_name,
            ))
        });

        sum
    }

    /// Diff of every record, removals included.
    pub fn diff(&self) -> Diff {
        let mut diff = Diff::default();

        diff.buckets.extend(self.buckets.values().map(|b| b.diff()));
        diff.checks.extend(self.checks.values().map(|c| c.diff()));
        diff.dashboards
            .extend(self.dashboards.values().map(|d| d.diff()));
        diff.labels.extend(self.labels.values().map(|l| l.diff()));
        diff.notification_endpoints
            .extend(self.endpoints.values().map(|e| e.diff()));
        diff.notification_rules.extend(self.rules.values().map(|r| {
            let endpoint = r
                .associated_endpoint
                .as_deref()
                .and_then(|pkg| self.endpoints.get(pkg));
            r.diff(endpoint)
        }));
        diff.tasks.extend(self.tasks.values().map(|t| t.diff()));
        diff.telegraf_configs
            .extend(self.telegrafs.values().map(|t| t.diff()));
        diff.variables
            .extend(self.variables.values().map(|v| v.diff()));

        for m in &self.label_mappings {
            let Some(ident) = self
                .record(m.resource_kind, &m.resource_pkg_name)
                .map(|r| r.state_identity())
            else {
                continue;
            };
            let Some(label) = self.labels.get(&m.label_pkg_name) else {
                continue;
            };
            diff.label_mappings.push(crate::diff::LabelMappingDiff {
                status: m.status,
                resource_type: ident.resource_type,
                resource_id: ident.id,
                resource_pkg_name: ident.pkg_name,
                resource_name: ident.name,
                label_id: label.platform_id(),
                label_pkg_name: m.label_pkg_name.clone(),
                label_name: label.parsed.identity.name(),
            });
        }
        for m in &self.mappings_to_remove {
            diff.label_mappings.push(crate::diff::LabelMappingDiff {
                status: StateStatus::Remove,
                resource_type: m.resource_type,
                resource_id: m.resource_id,
                resource_pkg_name: m.resource_pkg_name.clone(),
                resource_name: String::new(),
                label_id: m.label_id,
                label_pkg_name: m.label_pkg_name.clone(),
                label_name: self
                    .labels
                    .get(&m.label_pkg_name)
                    .map(|l| l.parsed.identity.name())
                    .unwrap_or_default(),
            });
        }
        diff.label_mappings.sort_by(|a, b| {
            (a.resource_type, &a.resource_pkg_name, &a.label_name).cmp(&(
                b.resource_type,
                &b.resource_pkg_name,
                &b.label_name,
            ))
        });

        diff
    }
}
