//! Service contracts
//!
//! The narrow capability interfaces the engine consumes. The engine never
//! constructs concrete clients; every platform touch goes through one of
//! these traits. All methods distinguish "not found" from transport failure
//! through [`ServiceError`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::ServiceResult;
use crate::ids::PlatformId;
use crate::kind::ResourceType;
use crate::platform::{
    Bucket, BucketUpdate, Check, Dashboard, DashboardUpdate, Label, LabelMappingRecord,
    LabelUpdate, NotificationEndpoint, NotificationRule, Task, TaskUpdate, TelegrafConfig,
    Variable, VariableUpdate,
};

#[async_trait]
pub trait BucketService: Send + Sync {
    async fn find_bucket_by_id(&self, id: PlatformId) -> ServiceResult<Bucket>;
    async fn find_bucket_by_name(&self, org_id: PlatformId, name: &str) -> ServiceResult<Bucket>;
    async fn find_buckets(&self, org_id: PlatformId) -> ServiceResult<Vec<Bucket>>;
    async fn create_bucket(&self, bucket: Bucket) -> ServiceResult<Bucket>;
    async fn update_bucket(&self, id: PlatformId, update: BucketUpdate) -> ServiceResult<Bucket>;
    async fn delete_bucket(&self, id: PlatformId) -> ServiceResult<()>;
}

#[async_trait]
pub trait CheckService: Send + Sync {
    async fn find_check_by_id(&self, id: PlatformId) -> ServiceResult<Check>;
    async fn find_check_by_name(&self, org_id: PlatformId, name: &str) -> ServiceResult<Check>;
    async fn find_checks(&self, org_id: PlatformId) -> ServiceResult<Vec<Check>>;
    async fn create_check(&self, check: Check) -> ServiceResult<Check>;
    async fn update_check(&self, id: PlatformId, check: Check) -> ServiceResult<Check>;
    async fn delete_check(&self, id: PlatformId) -> ServiceResult<()>;
}

#[async_trait]
pub trait DashboardService: Send + Sync {
    async fn find_dashboard_by_id(&self, id: PlatformId) -> ServiceResult<Dashboard>;
    async fn find_dashboards(&self, org_id: PlatformId) -> ServiceResult<Vec<Dashboard>>;
    async fn create_dashboard(&self, dashboard: Dashboard) -> ServiceResult<Dashboard>;
    async fn update_dashboard(
        &self,
        id: PlatformId,
        update: DashboardUpdate,
    ) -> ServiceResult<Dashboard>;
    async fn delete_dashboard(&self, id: PlatformId) -> ServiceResult<()>;
}

/// Labels plus the label-mapping edges they form with other resources.
///
/// Mapping create/delete are not assumed idempotent; rollback copes with
/// "already exists" and "not found" on replay.
#[async_trait]
pub trait LabelService: Send + Sync {
    async fn find_label_by_id(&self, id: PlatformId) -> ServiceResult<Label>;
    async fn find_label_by_name(&self, org_id: PlatformId, name: &str) -> ServiceResult<Label>;
    async fn find_labels(&self, org_id: PlatformId) -> ServiceResult<Vec<Label>>;
    async fn create_label(&self, label: Label) -> ServiceResult<Label>;
    async fn update_label(&self, id: PlatformId, update: LabelUpdate) -> ServiceResult<Label>;
    async fn delete_label(&self, id: PlatformId) -> ServiceResult<()>;

    async fn find_resource_labels(
        &self,
        resource_id: PlatformId,
        resource_type: ResourceType,
    ) -> ServiceResult<Vec<Label>>;
    async fn create_label_mapping(&self, mapping: LabelMappingRecord) -> ServiceResult<()>;
    async fn delete_label_mapping(&self, mapping: LabelMappingRecord) -> ServiceResult<()>;
}

#[async_trait]
pub trait NotificationEndpointService: Send + Sync {
    async fn find_endpoint_by_id(&self, id: PlatformId) -> ServiceResult<NotificationEndpoint>;
    async fn find_endpoints(&self, org_id: PlatformId) -> ServiceResult<Vec<NotificationEndpoint>>;
    async fn create_endpoint(
        &self,
        endpoint: NotificationEndpoint,
    ) -> ServiceResult<NotificationEndpoint>;
    async fn update_endpoint(
        &self,
        id: PlatformId,
        endpoint: NotificationEndpoint,
    ) -> ServiceResult<NotificationEndpoint>;
    async fn delete_endpoint(&self, id: PlatformId) -> ServiceResult<()>;
}

#[async_trait]
pub trait NotificationRuleService: Send + Sync {
    async fn find_rule_by_id(&self, id: PlatformId) -> ServiceResult<NotificationRule>;
    async fn find_rules(&self, org_id: PlatformId) -> ServiceResult<Vec<NotificationRule>>;
    async fn create_rule(&self, rule: NotificationRule) -> ServiceResult<NotificationRule>;
    async fn update_rule(
        &self,
        id: PlatformId,
        rule: NotificationRule,
    ) -> ServiceResult<NotificationRule>;
    async fn delete_rule(&self, id: PlatformId) -> ServiceResult<()>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn find_task_by_id(&self, id: PlatformId) -> ServiceResult<Task>;
    async fn find_tasks(&self, org_id: PlatformId) -> ServiceResult<Vec<Task>>;
    async fn create_task(&self, task: Task) -> ServiceResult<Task>;
    async fn update_task(&self, id: PlatformId, update: TaskUpdate) -> ServiceResult<Task>;
    async fn delete_task(&self, id: PlatformId) -> ServiceResult<()>;
}

#[async_trait]
pub trait TelegrafService: Send + Sync {
    async fn find_telegraf_by_id(&self, id: PlatformId) -> ServiceResult<TelegrafConfig>;
    async fn find_telegrafs(&self, org_id: PlatformId) -> ServiceResult<Vec<TelegrafConfig>>;
    async fn create_telegraf(&self, config: TelegrafConfig) -> ServiceResult<TelegrafConfig>;
    async fn update_telegraf(
        &self,
        id: PlatformId,
        config: TelegrafConfig,
    ) -> ServiceResult<TelegrafConfig>;
    async fn delete_telegraf(&self, id: PlatformId) -> ServiceResult<()>;
}

#[async_trait]
pub trait VariableService: Send + Sync {
    async fn find_variable_by_id(&self, id: PlatformId) -> ServiceResult<Variable>;
    /// Paginated listing; callers walk pages until a short page comes back.
    async fn find_variables(
        &self,
        org_id: PlatformId,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<Variable>>;
    async fn create_variable(&self, variable: Variable) -> ServiceResult<Variable>;
    async fn update_variable(
        &self,
        id: PlatformId,
        update: VariableUpdate,
    ) -> ServiceResult<Variable>;
    async fn delete_variable(&self, id: PlatformId) -> ServiceResult<()>;
}

/// Secret storage. Only keys ever flow through the engine; values pass
/// opaquely from the caller to this contract.
#[async_trait]
pub trait SecretService: Send + Sync {
    async fn list_secret_keys(&self, org_id: PlatformId) -> ServiceResult<Vec<String>>;
    async fn put_secrets(
        &self,
        org_id: PlatformId,
        secrets: HashMap<String, String>,
    ) -> ServiceResult<()>;
    async fn delete_secrets(&self, org_id: PlatformId, keys: Vec<String>) -> ServiceResult<()>;
}
