//! Mock platform services for the apply/export scenario suites.
//!
//! Every mock keeps its resources in a process-local store and counts
//! create/update/delete calls so scenarios can assert on observed side
//! effects. The rule service can be rigged to fail its Nth create.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vela_core::platform::{
    Bucket, BucketUpdate, Check, Dashboard, DashboardUpdate, Label, LabelMappingRecord,
    LabelUpdate, NotificationEndpoint, NotificationRule, Task, TaskUpdate, TelegrafConfig,
    Variable, VariableUpdate,
};
use vela_core::services::{
    BucketService, CheckService, DashboardService, LabelService, NotificationEndpointService,
    NotificationRuleService, SecretService, TaskService, TelegrafService, VariableService,
};
use vela_core::{IdGenerator, PlatformId, ResourceType, ServiceError, ServiceResult, Services};

pub struct SeqIdGen {
    next: Arc<AtomicU64>,
}

impl IdGenerator for SeqIdGen {
    fn next_id(&self) -> PlatformId {
        PlatformId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct CallCounts {
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CallCounts {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

pub struct MockBucketService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<Bucket>>,
    pub calls: CallCounts,
}

#[async_trait]
impl BucketService for MockBucketService {
    async fn find_bucket_by_id(&self, id: PlatformId) -> ServiceResult<Bucket> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("bucket {id}")))
    }

    async fn find_bucket_by_name(&self, org_id: PlatformId, name: &str) -> ServiceResult<Bucket> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.org_id == org_id && b.name == name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("bucket {name:?}")))
    }

    async fn find_buckets(&self, org_id: PlatformId) -> ServiceResult<Vec<Bucket>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, mut bucket: Bucket) -> ServiceResult<Bucket> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        bucket.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(bucket.clone());
        Ok(bucket)
    }

    async fn update_bucket(&self, id: PlatformId, update: BucketUpdate) -> ServiceResult<Bucket> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let bucket = store
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("bucket {id}")))?;
        if let Some(name) = update.name {
            bucket.name = name;
        }
        if let Some(description) = update.description {
            bucket.description = description;
        }
        if let Some(retention) = update.retention_seconds {
            bucket.retention_seconds = retention;
        }
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|b| b.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("bucket {id}")));
        }
        Ok(())
    }
}

pub struct MockCheckService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<Check>>,
    pub calls: CallCounts,
}

#[async_trait]
impl CheckService for MockCheckService {
    async fn find_check_by_id(&self, id: PlatformId) -> ServiceResult<Check> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("check {id}")))
    }

    async fn find_check_by_name(&self, org_id: PlatformId, name: &str) -> ServiceResult<Check> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.org_id == org_id && c.name == name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("check {name:?}")))
    }

    async fn find_checks(&self, org_id: PlatformId) -> ServiceResult<Vec<Check>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_check(&self, mut check: Check) -> ServiceResult<Check> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        check.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        check.task_id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(check.clone());
        Ok(check)
    }

    async fn update_check(&self, id: PlatformId, check: Check) -> ServiceResult<Check> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("check {id}")))?;
        let task_id = slot.task_id;
        *slot = Check {
            id,
            task_id,
            ..check
        };
        Ok(slot.clone())
    }

    async fn delete_check(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|c| c.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("check {id}")));
        }
        Ok(())
    }
}

pub struct MockDashboardService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<Dashboard>>,
    pub calls: CallCounts,
}

#[async_trait]
impl DashboardService for MockDashboardService {
    async fn find_dashboard_by_id(&self, id: PlatformId) -> ServiceResult<Dashboard> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("dashboard {id}")))
    }

    async fn find_dashboards(&self, org_id: PlatformId) -> ServiceResult<Vec<Dashboard>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_dashboard(&self, mut dashboard: Dashboard) -> ServiceResult<Dashboard> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        dashboard.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(dashboard.clone());
        Ok(dashboard)
    }

    async fn update_dashboard(
        &self,
        id: PlatformId,
        update: DashboardUpdate,
    ) -> ServiceResult<Dashboard> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let dash = store
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("dashboard {id}")))?;
        if let Some(name) = update.name {
            dash.name = name;
        }
        if let Some(description) = update.description {
            dash.description = description;
        }
        if let Some(cells) = update.cells {
            dash.cells = cells;
        }
        Ok(dash.clone())
    }

    async fn delete_dashboard(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|d| d.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("dashboard {id}")));
        }
        Ok(())
    }
}

pub struct MockLabelService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<Label>>,
    pub mappings: Mutex<Vec<LabelMappingRecord>>,
    pub calls: CallCounts,
    pub mapping_creates: AtomicUsize,
    pub mapping_deletes: AtomicUsize,
}

#[async_trait]
impl LabelService for MockLabelService {
    async fn find_label_by_id(&self, id: PlatformId) -> ServiceResult<Label> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("label {id}")))
    }

    async fn find_label_by_name(&self, org_id: PlatformId, name: &str) -> ServiceResult<Label> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.org_id == org_id && l.name == name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("label {name:?}")))
    }

    async fn find_labels(&self, org_id: PlatformId) -> ServiceResult<Vec<Label>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_label(&self, mut label: Label) -> ServiceResult<Label> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        label.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(label.clone());
        Ok(label)
    }

    async fn update_label(&self, id: PlatformId, update: LabelUpdate) -> ServiceResult<Label> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let label = store
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("label {id}")))?;
        if let Some(name) = update.name {
            label.name = name;
        }
        if let Some(color) = update.color {
            label.color = color;
        }
        if let Some(description) = update.description {
            label.description = description;
        }
        Ok(label.clone())
    }

    async fn delete_label(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|l| l.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("label {id}")));
        }
        self.mappings.lock().unwrap().retain(|m| m.label_id != id);
        Ok(())
    }

    async fn find_resource_labels(
        &self,
        resource_id: PlatformId,
        resource_type: ResourceType,
    ) -> ServiceResult<Vec<Label>> {
        let mappings = self.mappings.lock().unwrap();
        let store = self.store.lock().unwrap();
        Ok(mappings
            .iter()
            .filter(|m| m.resource_id == resource_id && m.resource_type == resource_type)
            .filter_map(|m| store.iter().find(|l| l.id == m.label_id).cloned())
            .collect())
    }

    async fn create_label_mapping(&self, mapping: LabelMappingRecord) -> ServiceResult<()> {
        self.mapping_creates.fetch_add(1, Ordering::SeqCst);
        let mut mappings = self.mappings.lock().unwrap();
        if mappings.contains(&mapping) {
            return Err(ServiceError::Conflict("mapping already exists".into()));
        }
        mappings.push(mapping);
        Ok(())
    }

    async fn delete_label_mapping(&self, mapping: LabelMappingRecord) -> ServiceResult<()> {
        self.mapping_deletes.fetch_add(1, Ordering::SeqCst);
        let mut mappings = self.mappings.lock().unwrap();
        let before = mappings.len();
        mappings.retain(|m| *m != mapping);
        if mappings.len() == before {
            return Err(ServiceError::not_found("label mapping".to_string()));
        }
        Ok(())
    }
}

pub struct MockEndpointService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<NotificationEndpoint>>,
    pub calls: CallCounts,
}

#[async_trait]
impl NotificationEndpointService for MockEndpointService {
    async fn find_endpoint_by_id(&self, id: PlatformId) -> ServiceResult<NotificationEndpoint> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("notification endpoint {id}")))
    }

    async fn find_endpoints(&self, org_id: PlatformId) -> ServiceResult<Vec<NotificationEndpoint>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_endpoint(
        &self,
        mut endpoint: NotificationEndpoint,
    ) -> ServiceResult<NotificationEndpoint> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        endpoint.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint(
        &self,
        id: PlatformId,
        endpoint: NotificationEndpoint,
    ) -> ServiceResult<NotificationEndpoint> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("notification endpoint {id}")))?;
        *slot = NotificationEndpoint { id, ..endpoint };
        Ok(slot.clone())
    }

    async fn delete_endpoint(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|e| e.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!(
                "notification endpoint {id}"
            )));
        }
        Ok(())
    }
}

pub struct MockRuleService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<NotificationRule>>,
    pub calls: CallCounts,
    /// When non-zero, the Nth create call fails.
    pub fail_create_on: AtomicUsize,
}

#[async_trait]
impl NotificationRuleService for MockRuleService {
    async fn find_rule_by_id(&self, id: PlatformId) -> ServiceResult<NotificationRule> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("notification rule {id}")))
    }

    async fn find_rules(&self, org_id: PlatformId) -> ServiceResult<Vec<NotificationRule>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_rule(&self, mut rule: NotificationRule) -> ServiceResult<NotificationRule> {
        let call = self.calls.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_on = self.fail_create_on.load(Ordering::SeqCst);
        if fail_on != 0 && call == fail_on {
            return Err(ServiceError::Internal(
                "rule service rigged to fail".to_string(),
            ));
        }
        rule.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        rule.task_id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(rule.clone());
        Ok(rule)
    }

    async fn update_rule(
        &self,
        id: PlatformId,
        rule: NotificationRule,
    ) -> ServiceResult<NotificationRule> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("notification rule {id}")))?;
        let task_id = slot.task_id;
        *slot = NotificationRule { id, task_id, ..rule };
        Ok(slot.clone())
    }

    async fn delete_rule(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|r| r.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("notification rule {id}")));
        }
        Ok(())
    }
}

pub struct MockTaskService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<Task>>,
    pub calls: CallCounts,
}

#[async_trait]
impl TaskService for MockTaskService {
    async fn find_task_by_id(&self, id: PlatformId) -> ServiceResult<Task> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("task {id}")))
    }

    async fn find_tasks(&self, org_id: PlatformId) -> ServiceResult<Vec<Task>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_task(&self, mut task: Task) -> ServiceResult<Task> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        task.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: PlatformId, update: TaskUpdate) -> ServiceResult<Task> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let task = store
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("task {id}")))?;
        if let Some(name) = update.name {
            task.name = name;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(query) = update.query {
            task.query = query;
        }
        if let Some(every) = update.every_seconds {
            task.every_seconds = every;
        }
        if let Some(offset) = update.offset_seconds {
            task.offset_seconds = offset;
        }
        if let Some(cron) = update.cron {
            task.cron = cron;
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|t| t.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("task {id}")));
        }
        Ok(())
    }
}

pub struct MockTelegrafService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<TelegrafConfig>>,
    pub calls: CallCounts,
}

#[async_trait]
impl TelegrafService for MockTelegrafService {
    async fn find_telegraf_by_id(&self, id: PlatformId) -> ServiceResult<TelegrafConfig> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("telegraf config {id}")))
    }

    async fn find_telegrafs(&self, org_id: PlatformId) -> ServiceResult<Vec<TelegrafConfig>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_telegraf(&self, mut config: TelegrafConfig) -> ServiceResult<TelegrafConfig> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        config.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(config.clone());
        Ok(config)
    }

    async fn update_telegraf(
        &self,
        id: PlatformId,
        config: TelegrafConfig,
    ) -> ServiceResult<TelegrafConfig> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("telegraf config {id}")))?;
        *slot = TelegrafConfig { id, ..config };
        Ok(slot.clone())
    }

    async fn delete_telegraf(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|t| t.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("telegraf config {id}")));
        }
        Ok(())
    }
}

pub struct MockVariableService {
    ids: Arc<AtomicU64>,
    pub store: Mutex<Vec<Variable>>,
    pub calls: CallCounts,
}

#[async_trait]
impl VariableService for MockVariableService {
    async fn find_variable_by_id(&self, id: PlatformId) -> ServiceResult<Variable> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("variable {id}")))
    }

    async fn find_variables(
        &self,
        org_id: PlatformId,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<Variable>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.org_id == org_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_variable(&self, mut variable: Variable) -> ServiceResult<Variable> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        variable.id = PlatformId(self.ids.fetch_add(1, Ordering::SeqCst));
        self.store.lock().unwrap().push(variable.clone());
        Ok(variable)
    }

    async fn update_variable(
        &self,
        id: PlatformId,
        update: VariableUpdate,
    ) -> ServiceResult<Variable> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let variable = store
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("variable {id}")))?;
        if let Some(name) = update.name {
            variable.name = name;
        }
        if let Some(description) = update.description {
            variable.description = description;
        }
        if let Some(arguments) = update.arguments {
            variable.arguments = arguments;
        }
        Ok(variable.clone())
    }

    async fn delete_variable(&self, id: PlatformId) -> ServiceResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|v| v.id != id);
        if store.len() == before {
            return Err(ServiceError::not_found(format!("variable {id}")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSecretService {
    pub store: Mutex<HashMap<PlatformId, BTreeMap<String, String>>>,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
}

#[async_trait]
impl SecretService for MockSecretService {
    async fn list_secret_keys(&self, org_id: PlatformId) -> ServiceResult<Vec<String>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .get(&org_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_secrets(
        &self,
        org_id: PlatformId,
        secrets: HashMap<String, String>,
    ) -> ServiceResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.store
            .lock()
            .unwrap()
            .entry(org_id)
            .or_default()
            .extend(secrets);
        Ok(())
    }

    async fn delete_secrets(&self, org_id: PlatformId, keys: Vec<String>) -> ServiceResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(org) = self.store.lock().unwrap().get_mut(&org_id) {
            for key in keys {
                org.remove(&key);
            }
        }
        Ok(())
    }
}

/// The full mock platform a scenario runs against.
pub struct TestPlatform {
    pub ids: Arc<AtomicU64>,
    pub buckets: Arc<MockBucketService>,
    pub checks: Arc<MockCheckService>,
    pub dashboards: Arc<MockDashboardService>,
    pub labels: Arc<MockLabelService>,
    pub endpoints: Arc<MockEndpointService>,
    pub rules: Arc<MockRuleService>,
    pub tasks: Arc<MockTaskService>,
    pub telegrafs: Arc<MockTelegrafService>,
    pub variables: Arc<MockVariableService>,
    pub secrets: Arc<MockSecretService>,
}

impl TestPlatform {
    pub fn new() -> Self {
        let ids = Arc::new(AtomicU64::new(1));
        Self {
            buckets: Arc::new(MockBucketService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            checks: Arc::new(MockCheckService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            dashboards: Arc::new(MockDashboardService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            labels: Arc::new(MockLabelService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                mappings: Mutex::default(),
                calls: CallCounts::default(),
                mapping_creates: AtomicUsize::new(0),
                mapping_deletes: AtomicUsize::new(0),
            }),
            endpoints: Arc::new(MockEndpointService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            rules: Arc::new(MockRuleService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
                fail_create_on: AtomicUsize::new(0),
            }),
            tasks: Arc::new(MockTaskService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            telegrafs: Arc::new(MockTelegrafService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            variables: Arc::new(MockVariableService {
                ids: Arc::clone(&ids),
                store: Mutex::default(),
                calls: CallCounts::default(),
            }),
            secrets: Arc::new(MockSecretService::default()),
            ids,
        }
    }

    pub fn id_gen(&self) -> Arc<SeqIdGen> {
        Arc::new(SeqIdGen {
            next: Arc::clone(&self.ids),
        })
    }

    pub fn services(&self) -> Services {
        Services {
            buckets: self.buckets.clone(),
            checks: self.checks.clone(),
            dashboards: self.dashboards.clone(),
            labels: self.labels.clone(),
            endpoints: self.endpoints.clone(),
            rules: self.rules.clone(),
            tasks: self.tasks.clone(),
            telegrafs: self.telegrafs.clone(),
            variables: self.variables.clone(),
            secrets: self.secrets.clone(),
        }
    }

    /// Total create calls observed across every resource service.
    pub fn total_creates(&self) -> usize {
        self.buckets.calls.creates()
            + self.checks.calls.creates()
            + self.dashboards.calls.creates()
            + self.labels.calls.creates()
            + self.endpoints.calls.creates()
            + self.rules.calls.creates()
            + self.tasks.calls.creates()
            + self.telegrafs.calls.creates()
            + self.variables.calls.creates()
    }

    /// Whether every resource store is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.store.lock().unwrap().is_empty()
            && self.checks.store.lock().unwrap().is_empty()
            && self.dashboards.store.lock().unwrap().is_empty()
            && self.labels.store.lock().unwrap().is_empty()
            && self.endpoints.store.lock().unwrap().is_empty()
            && self.rules.store.lock().unwrap().is_empty()
            && self.tasks.store.lock().unwrap().is_empty()
            && self.telegrafs.store.lock().unwrap().is_empty()
            && self.variables.store.lock().unwrap().is_empty()
            && self.labels.mappings.lock().unwrap().is_empty()
    }
}
