//! Apply / rollback coordination
//!
//! Executes the reconciliation plan in staged dependency order: secrets,
//! labels, primary resources, notification rules, label mappings. Within a
//! stage, per-resource workers run concurrently behind a semaphore; stages
//! are strictly sequential. Every forward action that commits registers a
//! compensation; the first stage that reports an error aborts the pipeline
//! and the compensations run in reverse registration order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::cancel::CancelToken;
use crate::diff::Diff;
use crate::engine::{ApplyOpts, Engine};
use crate::errors::{ApplyFailure, ApplyReport, EngineError, ServiceError};
use crate::ids::PlatformId;
use crate::kind::Kind;
use crate::package::API_VERSION;
use crate::platform::{
    Bucket, BucketUpdate, Check, Dashboard, DashboardUpdate, Label, LabelMappingRecord,
    LabelUpdate, NotificationEndpoint, NotificationRule, Task, TaskUpdate, TelegrafConfig,
    Variable, VariableUpdate,
};
use crate::resources::Status;
use crate::services::{
    BucketService, CheckService, DashboardService, LabelService, NotificationEndpointService,
    NotificationRuleService, TaskService, TelegrafService, VariableService,
};
use crate::stack::{StackResource, StackResourceAssociation};
use crate::state::{
    BucketState, CheckState, DashboardState, EndpointState, LabelState, RuleState,
    StateCoordinator, StateLabelMappingForRemoval, StateStatus, TaskState,
    TelegrafState, VariableState,
};
use crate::summary::Summary;

/// Timeout applied to every individual service operation.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// The coordinator mutex: stage workers hold it only to snapshot the record
/// they own and to write back result ids. Service I/O happens outside it.
type SharedState = Arc<Mutex<StateCoordinator>>;

type TaskFuture = Pin<Box<dyn Future<Output = Option<ApplyFailure>> + Send>>;
type RollbackFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type RollbackFn = Box<dyn FnOnce() -> RollbackFuture + Send>;

/// One stage group: forward tasks plus the compensation for whatever subset
/// of them ends up committing.
pub(crate) struct Applier {
    resource: &'static str,
    tasks: Vec<TaskFuture>,
    rollback: RollbackFn,
}

fn noop_rollback() -> RollbackFn {
    Box::new(|| Box::pin(async { Ok(()) }))
}

/// Runs a service operation under the per-operation timeout, aborting at
/// the next suspension point if the token is cancelled.
async fn guarded<T>(
    cancel: &CancelToken,
    fut: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        res = tokio::time::timeout(OPERATION_TIMEOUT, fut) => match res {
            Ok(r) => r,
            Err(_) => Err(ServiceError::Timeout(OPERATION_TIMEOUT.as_secs())),
        },
    }
}

struct ErrMsg {
    resource: &'static str,
    failure: ApplyFailure,
    cancelled: bool,
}

struct RollbackCoordinator {
    limit: usize,
    rollbacks: Vec<(&'static str, RollbackFn)>,
}

impl RollbackCoordinator {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            rollbacks: Vec::new(),
        }
    }

    /// Drains every applier in the group, bounded by the semaphore, and
    /// collects worker failures grouped by resource kind. Compensations for
    /// the group are registered up front; they only act on work their
    /// workers recorded as committed.
    async fn run_til_end(
        &mut self,
        cancel: &CancelToken,
        appliers: Vec<Applier>,
    ) -> Result<(), EngineError> {
        let sem = Arc::new(Semaphore::new(self.limit));
        let (tx, mut rx) = mpsc::channel::<ErrMsg>(1);

        let collector = tokio::spawn(async move {
            let mut report = ApplyReport::default();
            let mut saw_cancelled = false;
            while let Some(msg) = rx.recv().await {
                if msg.cancelled {
                    saw_cancelled = true;
                    continue;
                }
                report.push(msg.resource, msg.failure);
            }
            (report, saw_cancelled)
        });

        let mut workers = JoinSet::new();
        'stage: for applier in appliers {
            let resource = applier.resource;
            self.rollbacks.push((resource, applier.rollback));

            for task in applier.tasks {
                if cancel.is_cancelled() {
                    break 'stage;
                }
                let Ok(permit) = Arc::clone(&sem).acquire_owned().await else {
                    break 'stage;
                };
                let tx = tx.clone();
                workers.spawn(async move {
                    let _permit = permit;
                    if let Some(failure) = task.await {
                        let cancelled =
                            failure.message == ServiceError::Cancelled.to_string();
                        let _ = tx
                            .send(ErrMsg {
                                resource,
                                failure,
                                cancelled,
                            })
                            .await;
                    }
                });
            }
        }
        drop(tx);
        while workers.join_next().await.is_some() {}

        let (report, saw_cancelled) = match collector.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%err, "apply error collector failed");
                (ApplyReport::default(), false)
            }
        };

        if !report.is_empty() {
            return Err(EngineError::Apply(report));
        }
        if saw_cancelled || cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Invokes every registered compensation in reverse registration order.
    /// A failing compensation is logged and skipped; the loop always visits
    /// all of them.
    async fn rollback(&mut self) {
        for (resource, rollback) in self.rollbacks.drain(..).rev() {
            debug!(resource, "rolling back");
            if let Err(err) = rollback().await {
                warn!(resource, %err, "failed to roll back resource group");
            }
        }
    }
}

impl Engine {
    pub(crate) async fn apply_state(
        &self,
        org_id: PlatformId,
        state: StateCoordinator,
        opts: &ApplyOpts,
    ) -> Result<(Summary, Diff), EngineError> {
        let shared: SharedState = Arc::new(Mutex::new(state));
        let mut coordinator = RollbackCoordinator::new(self.apply_limit);

        let result = self
            .run_stages(&mut coordinator, org_id, &shared, opts)
            .await;

        match result {
            Ok(()) => {
                if let Some(stack_id) = opts.stack_id {
                    if let Err(err) = self.update_stack_after_success(stack_id, &shared).await {
                        error!(%err, "failed to update stack after apply");
                    }
                }
                let mut st = shared.lock().await;
                st.mark_provided_secrets(opts.secrets.keys());
                Ok((st.summary(), st.diff()))
            }
            // committed work stays put on cancellation; only real failures
            // trigger the compensation run
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(err) => {
                coordinator.rollback().await;
                if let Some(stack_id) = opts.stack_id {
                    if let Err(stack_err) =
                        self.update_stack_after_rollback(stack_id, &shared).await
                    {
                        error!(%stack_err, "failed to update stack after rollback");
                    }
                }
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        coordinator: &mut RollbackCoordinator,
        org_id: PlatformId,
        shared: &SharedState,
        opts: &ApplyOpts,
    ) -> Result<(), EngineError> {
        let cancel = &opts.cancel;

        let (
            label_keys,
            variable_keys,
            bucket_keys,
            check_keys,
            dashboard_keys,
            endpoint_keys,
            rule_keys,
            task_keys,
            telegraf_keys,
            mappings,
            removals,
        ) = {
            let st = shared.lock().await;
            (
                st.labels.keys().cloned().collect::<Vec<_>>(),
                st.variables.keys().cloned().collect::<Vec<_>>(),
                st.buckets.keys().cloned().collect::<Vec<_>>(),
                st.checks.keys().cloned().collect::<Vec<_>>(),
                st.dashboards.keys().cloned().collect::<Vec<_>>(),
                st.endpoints.keys().cloned().collect::<Vec<_>>(),
                st.rules.keys().cloned().collect::<Vec<_>>(),
                st.tasks.keys().cloned().collect::<Vec<_>>(),
                st.telegrafs.keys().cloned().collect::<Vec<_>>(),
                st.label_mappings.clone(),
                st.mappings_to_remove.clone(),
            )
        };

        let (endpoint_applier, rule_applier) =
            self.notification_appliers(shared, endpoint_keys, rule_keys, cancel);

        coordinator
            .run_til_end(
                cancel,
                vec![self.secrets_applier(org_id, opts.secrets.clone(), cancel)],
            )
            .await?;

        coordinator
            .run_til_end(cancel, vec![self.labels_applier(shared, label_keys, cancel)])
            .await?;

        coordinator
            .run_til_end(
                cancel,
                vec![
                    self.variables_applier(shared, variable_keys, cancel),
                    self.buckets_applier(shared, bucket_keys, cancel),
                    self.checks_applier(shared, check_keys, cancel),
                    self.dashboards_applier(shared, dashboard_keys, cancel),
                    endpoint_applier,
                    self.tasks_applier(shared, task_keys, cancel),
                    self.telegrafs_applier(shared, telegraf_keys, cancel),
                ],
            )
            .await?;

        // rules rely on endpoints existing with final ids
        coordinator.run_til_end(cancel, vec![rule_applier]).await?;

        coordinator
            .run_til_end(
                cancel,
                vec![
                    self.add_mappings_applier(shared, mappings.len(), cancel),
                    self.remove_mappings_applier(removals, cancel),
                ],
            )
            .await?;

        Ok(())
    }

    fn buckets_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.buckets);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.buckets.get(&key).cloned() };
                let Some(bucket) = snapshot else { return None };
                if !bucket.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_bucket(&svc, &bucket)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.buckets.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: bucket.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.buckets.get(&key).cloned() };
                    let Some(bucket) = snapshot else { continue };
                    match rollback_bucket(&svc, &bucket).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.buckets.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => errs
                            .push(format!("error for bucket[{}]: {err}", bucket.platform_id())),
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "bucket",
            tasks,
            rollback,
        }
    }

    fn labels_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.labels);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.labels.get(&key).cloned() };
                let Some(label) = snapshot else { return None };
                if !label.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_label(&svc, &label)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.labels.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: label.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.labels.get(&key).cloned() };
                    let Some(label) = snapshot else { continue };
                    match rollback_label(&svc, &label).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.labels.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            errs.push(format!("error for label[{}]: {err}", label.platform_id()))
                        }
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "label",
            tasks,
            rollback,
        }
    }

    fn checks_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.checks);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.checks.get(&key).cloned() };
                let Some(check) = snapshot else { return None };
                if !check.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_check(&svc, &check)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.checks.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: check.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.checks.get(&key).cloned() };
                    let Some(check) = snapshot else { continue };
                    match rollback_check(&svc, &check).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.checks.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            errs.push(format!("error for check[{}]: {err}", check.platform_id()))
                        }
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "check",
            tasks,
            rollback,
        }
    }

    fn dashboards_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.dashboards);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.dashboards.get(&key).cloned() };
                let Some(dash) = snapshot else { return None };
                if !dash.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_dashboard(&svc, &dash)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.dashboards.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: dash.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.dashboards.get(&key).cloned() };
                    let Some(dash) = snapshot else { continue };
                    match rollback_dashboard(&svc, &dash).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.dashboards.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => errs.push(format!(
                            "error for dashboard[{}]: {err}",
                            dash.platform_id()
                        )),
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "dashboard",
            tasks,
            rollback,
        }
    }

    fn tasks_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.tasks);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.tasks.get(&key).cloned() };
                let Some(task) = snapshot else { return None };
                if !task.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_task(&svc, &task)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.tasks.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: task.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.tasks.get(&key).cloned() };
                    let Some(task) = snapshot else { continue };
                    match rollback_task(&svc, &task).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.tasks.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            errs.push(format!("error for task[{}]: {err}", task.platform_id()))
                        }
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "task",
            tasks,
            rollback,
        }
    }

    fn telegrafs_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.telegrafs);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.telegrafs.get(&key).cloned() };
                let Some(tele) = snapshot else { return None };
                if !tele.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_telegraf(&svc, &tele)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.telegrafs.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: tele.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.telegrafs.get(&key).cloned() };
                    let Some(tele) = snapshot else { continue };
                    match rollback_telegraf(&svc, &tele).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.telegrafs.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => errs.push(format!(
                            "error for telegraf config[{}]: {err}",
                            tele.platform_id()
                        )),
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "telegraf",
            tasks,
            rollback,
        }
    }

    fn variables_applier(
        &self,
        shared: &SharedState,
        keys: Vec<String>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.variables);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(keys.len());
        for key in keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.variables.get(&key).cloned() };
                let Some(var) = snapshot else { return None };
                if !var.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_variable(&svc, &var)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.variables.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: var.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let state = Arc::clone(shared);
        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                let mut errs = Vec::new();
                for key in keys {
                    let snapshot = { state.lock().await.variables.get(&key).cloned() };
                    let Some(var) = snapshot else { continue };
                    match rollback_variable(&svc, &var).await {
                        Ok(Some(restored)) => {
                            let mut st = state.lock().await;
                            if let Some(rec) = st.variables.get_mut(&key) {
                                rec.existing = Some(restored);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            errs.push(format!("error for variable[{}]: {err}", var.platform_id()))
                        }
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "variable",
            tasks,
            rollback,
        }
    }

    /// Builds the endpoint and rule appliers as a coupled pair: on rollback
    /// the endpoint compensations run first so a recreated rule has a live
    /// endpoint to reference, then the rule compensations are chained in.
    fn notification_appliers(
        &self,
        shared: &SharedState,
        endpoint_keys: Vec<String>,
        rule_keys: Vec<String>,
        cancel: &CancelToken,
    ) -> (Applier, Applier) {
        let endpoint_committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let endpoint_svc = Arc::clone(&self.svc.endpoints);

        let mut endpoint_tasks: Vec<TaskFuture> = Vec::with_capacity(endpoint_keys.len());
        for key in endpoint_keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&endpoint_svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&endpoint_committed);
            endpoint_tasks.push(Box::pin(async move {
                let snapshot = { state.lock().await.endpoints.get(&key).cloned() };
                let Some(endpoint) = snapshot else { return None };
                if !endpoint.should_apply() {
                    return None;
                }

                match guarded(&cancel, apply_endpoint(&svc, &endpoint)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.endpoints.get_mut(&key) {
                            rec.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: endpoint.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let rule_committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let rule_svc = Arc::clone(&self.svc.rules);

        let mut rule_tasks: Vec<TaskFuture> = Vec::with_capacity(rule_keys.len());
        for key in rule_keys {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&rule_svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&rule_committed);
            rule_tasks.push(Box::pin(async move {
                let (snapshot, endpoint_id) = {
                    let st = state.lock().await;
                    let rule = st.rules.get(&key).cloned();
                    let endpoint_id = rule
                        .as_ref()
                        .and_then(|r| r.associated_endpoint.as_deref())
                        .and_then(|pkg| st.endpoints.get(pkg))
                        .map(|e| e.platform_id())
                        .unwrap_or(PlatformId::ZERO);
                    (rule, endpoint_id)
                };
                let Some(rule) = snapshot else { return None };
                if !rule.should_apply(endpoint_id) {
                    return None;
                }

                match guarded(&cancel, apply_rule(&svc, &rule, endpoint_id)).await {
                    Ok(applied) => {
                        let mut st = state.lock().await;
                        if let Some(rec) = st.rules.get_mut(&key) {
                            rec.inner.id = applied.id;
                        }
                        committed.lock().await.push(key);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: rule.inner.parsed.identity.pkg_name(),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let endpoint_rollback = {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&endpoint_svc);
            let committed = Arc::clone(&endpoint_committed);
            move || -> RollbackFuture {
                Box::pin(async move {
                    let keys = committed.lock().await.clone();
                    let mut errs = Vec::new();
                    for key in keys {
                        let snapshot = { state.lock().await.endpoints.get(&key).cloned() };
                        let Some(endpoint) = snapshot else { continue };
                        match rollback_endpoint(&svc, &endpoint).await {
                            Ok(Some(restored)) => {
                                let mut st = state.lock().await;
                                if let Some(rec) = st.endpoints.get_mut(&key) {
                                    rec.existing = Some(restored);
                                }
                            }
                            Ok(None) => {}
                            Err(err) => errs.push(format!(
                                "error for notification endpoint[{}]: {err}",
                                endpoint.platform_id()
                            )),
                        }
                    }
                    if errs.is_empty() {
                        Ok(())
                    } else {
                        Err(errs.join("; "))
                    }
                })
            }
        };

        let rule_rollback = {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&rule_svc);
            let committed = Arc::clone(&rule_committed);
            move || -> RollbackFuture {
                Box::pin(async move {
                    let keys = committed.lock().await.clone();
                    let mut errs = Vec::new();
                    for key in keys {
                        let (snapshot, endpoint_id) = {
                            let st = state.lock().await;
                            let rule = st.rules.get(&key).cloned();
                            let endpoint_id = rule
                                .as_ref()
                                .and_then(|r| r.associated_endpoint.as_deref())
                                .and_then(|pkg| st.endpoints.get(pkg))
                                .map(|e| e.platform_id())
                                .unwrap_or(PlatformId::ZERO);
                            (rule, endpoint_id)
                        };
                        let Some(rule) = snapshot else { continue };
                        match rollback_rule(&svc, &rule, endpoint_id).await {
                            Ok(Some(restored)) => {
                                let mut st = state.lock().await;
                                if let Some(rec) = st.rules.get_mut(&key) {
                                    rec.inner.existing = Some(restored);
                                }
                            }
                            Ok(None) => {}
                            Err(err) => errs.push(format!(
                                "error for notification rule[{}]: {err}",
                                rule.platform_id()
                            )),
                        }
                    }
                    if errs.is_empty() {
                        Ok(())
                    } else {
                        Err(errs.join("; "))
                    }
                })
            }
        };

        // the endpoint compensation carries the rule compensation so the
        // endpoint restore settles before any rule references it
        let chained: RollbackFn = Box::new(move || {
            Box::pin(async move {
                if let Err(err) = endpoint_rollback().await {
                    warn!(%err, "failed to roll back notification endpoints");
                }
                rule_rollback().await
            })
        });

        let endpoint_applier = Applier {
            resource: "notification_endpoint",
            tasks: endpoint_tasks,
            rollback: chained,
        };
        let rule_applier = Applier {
            resource: "notification_rule",
            tasks: rule_tasks,
            rollback: noop_rollback(),
        };
        (endpoint_applier, rule_applier)
    }

    /// Stage 0: puts the caller-provided secret values. Rollback is a
    /// best-effort delete of exactly the keys this apply added.
    fn secrets_applier(
        &self,
        org_id: PlatformId,
        secrets: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Applier {
        if secrets.is_empty() {
            return Applier {
                resource: "secrets",
                tasks: Vec::new(),
                rollback: noop_rollback(),
            };
        }

        let committed: Arc<Mutex<Vec<String>>> = Arc::default();
        let svc = Arc::clone(&self.svc.secrets);

        let task: TaskFuture = {
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            let secrets = secrets.clone();
            Box::pin(async move {
                let keys: Vec<String> = secrets.keys().cloned().collect();
                match guarded(&cancel, svc.put_secrets(org_id, secrets)).await {
                    Ok(()) => {
                        committed.lock().await.extend(keys);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: "secrets".to_string(),
                        message: err.to_string(),
                    }),
                }
            })
        };

        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let keys = committed.lock().await.clone();
                if keys.is_empty() {
                    return Ok(());
                }
                svc.delete_secrets(org_id, keys)
                    .await
                    .map_err(|e| e.to_string())
            })
        });

        Applier {
            resource: "secrets",
            tasks: vec![task],
            rollback,
        }
    }

    /// Stage 4a: creates the planned label mappings. Pre-existing mappings
    /// and records without settled ids are skipped, which also keeps them
    /// out of the rollback set.
    fn add_mappings_applier(
        &self,
        shared: &SharedState,
        mapping_count: usize,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<LabelMappingRecord>>> = Arc::default();
        let svc = Arc::clone(&self.svc.labels);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(mapping_count);
        for idx in 0..mapping_count {
            let state = Arc::clone(shared);
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let resolved = {
                    let st = state.lock().await;
                    st.label_mappings.get(idx).and_then(|m| {
                        let ident = st.record(m.resource_kind, &m.resource_pkg_name)?
                            .state_identity();
                        let label = st.get_label(&m.label_pkg_name)?;
                        Some((
                            m.status,
                            LabelMappingRecord {
                                label_id: label.platform_id(),
                                resource_id: ident.id,
                                resource_type: ident.resource_type,
                            },
                        ))
                    })
                };
                let Some((status, record)) = resolved else { return None };
                if status.is_exists()
                    || record.label_id.is_zero()
                    || record.resource_id.is_zero()
                {
                    return None;
                }

                match guarded(&cancel, svc.create_label_mapping(record)).await {
                    Ok(()) => {
                        committed.lock().await.push(record);
                        None
                    }
                    Err(err) => Some(ApplyFailure {
                        pkg_name: format!(
                            "{}:{}:{}",
                            record.resource_type, record.resource_id, record.label_id
                        ),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let records = committed.lock().await.clone();
                let mut errs = Vec::new();
                for record in records {
                    match svc.delete_label_mapping(record).await {
                        Ok(()) => {}
                        Err(err) if err.is_absorbable() => {}
                        Err(_) => errs
                            .push(format!("{}:{}", record.label_id, record.resource_id)),
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(format!(
                        "label_resource_id_pairs=[{}] err=\"unable to delete label mapping\"",
                        errs.join(", ")
                    ))
                }
            })
        });

        Applier {
            resource: "label_mapping",
            tasks,
            rollback,
        }
    }

    /// Stage 4b: deletes mappings the stack recorded but the package no
    /// longer declares. Absent mappings are treated as already deleted.
    fn remove_mappings_applier(
        &self,
        removals: Vec<StateLabelMappingForRemoval>,
        cancel: &CancelToken,
    ) -> Applier {
        let committed: Arc<Mutex<Vec<LabelMappingRecord>>> = Arc::default();
        let svc = Arc::clone(&self.svc.labels);

        let mut tasks: Vec<TaskFuture> = Vec::with_capacity(removals.len());
        for removal in removals {
            let svc = Arc::clone(&svc);
            let cancel = cancel.clone();
            let committed = Arc::clone(&committed);
            tasks.push(Box::pin(async move {
                let record = LabelMappingRecord {
                    label_id: removal.label_id,
                    resource_id: removal.resource_id,
                    resource_type: removal.resource_type,
                };

                match guarded(&cancel, svc.delete_label_mapping(record)).await {
                    Ok(()) => {
                        committed.lock().await.push(record);
                        None
                    }
                    Err(err) if err.is_not_found() => None,
                    Err(err) => Some(ApplyFailure {
                        pkg_name: format!(
                            "{}:{}:{}",
                            record.resource_type, record.resource_id, record.label_id
                        ),
                        message: err.to_string(),
                    }),
                }
            }));
        }

        let rollback: RollbackFn = Box::new(move || {
            Box::pin(async move {
                let records = committed.lock().await.clone();
                let mut errs = Vec::new();
                for record in records {
                    match svc.create_label_mapping(record).await {
                        Ok(()) => {}
                        Err(err) if err.is_absorbable() => {}
                        Err(err) => errs.push(format!(
                            "error for label mapping: resource_type={} resource_id={} label_id={} err={err}",
                            record.resource_type, record.resource_id, record.label_id
                        )),
                    }
                }
                if errs.is_empty() {
                    Ok(())
                } else {
                    Err(errs.join("; "))
                }
            })
        });

        Applier {
            resource: "removed_label_mapping",
            tasks,
            rollback,
        }
    }

    /// Rewrites the stack to exactly the set of surviving resources with
    /// their settled platform ids and label associations.
    async fn update_stack_after_success(
        &self,
        stack_id: PlatformId,
        shared: &SharedState,
    ) -> Result<(), ServiceError> {
        let st = shared.lock().await;
        let mut stack = self.store.read_stack(stack_id).await?;

        let mut resources: Vec<StackResource> = Vec::new();
        let label_assocs = |kind: Kind, pkg_name: &str| -> Vec<StackResourceAssociation> {
            st.label_associations(kind, pkg_name)
                .into_iter()
                .map(|l| StackResourceAssociation {
                    kind: Kind::Label,
                    pkg_name: l.parsed.identity.pkg_name(),
                })
                .collect()
        };

        for (name, b) in st.buckets.iter().filter(|(_, b)| !b.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: b.platform_id(),
                kind: Kind::Bucket,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::Bucket, name),
            });
        }
        for (name, c) in st.checks.iter().filter(|(_, c)| !c.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: c.platform_id(),
                kind: Kind::Check,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::Check, name),
            });
        }
        for (name, d) in st.dashboards.iter().filter(|(_, d)| !d.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: d.platform_id(),
                kind: Kind::Dashboard,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::Dashboard, name),
            });
        }
        for (name, l) in st.labels.iter().filter(|(_, l)| !l.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: l.platform_id(),
                kind: Kind::Label,
                pkg_name: name.clone(),
                associations: Vec::new(),
            });
        }
        for (name, e) in st.endpoints.iter().filter(|(_, e)| !e.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: e.platform_id(),
                kind: Kind::NotificationEndpoint,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::NotificationEndpoint, name),
            });
        }
        for (name, r) in st.rules.iter().filter(|(_, r)| !r.inner.status.is_remove()) {
            let mut associations = label_assocs(Kind::NotificationRule, name);
            if let Some(endpoint) = r.endpoint_association() {
                associations.push(endpoint);
            }
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: r.platform_id(),
                kind: Kind::NotificationRule,
                pkg_name: name.clone(),
                associations,
            });
        }
        for (name, t) in st.tasks.iter().filter(|(_, t)| !t.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: t.platform_id(),
                kind: Kind::Task,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::Task, name),
            });
        }
        for (name, t) in st.telegrafs.iter().filter(|(_, t)| !t.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: t.platform_id(),
                kind: Kind::Telegraf,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::Telegraf, name),
            });
        }
        for (name, v) in st.variables.iter().filter(|(_, v)| !v.status.is_remove()) {
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: v.platform_id(),
                kind: Kind::Variable,
                pkg_name: name.clone(),
                associations: label_assocs(Kind::Variable, name),
            });
        }

        stack.resources = resources;
        stack.updated_at = chrono::Utc::now();
        self.store.update_stack(stack).await
    }

    /// After a rollback, re-points stack entries at resources that were
    /// deleted and then recreated under a fresh id, and refreshes changed
    /// rule→endpoint associations. Skips the write when nothing moved.
    async fn update_stack_after_rollback(
        &self,
        stack_id: PlatformId,
        shared: &SharedState,
    ) -> Result<(), ServiceError> {
        let st = shared.lock().await;
        let mut stack = self.store.read_stack(stack_id).await?;

        let mut has_changes = false;
        for res in stack.resources.iter_mut() {
            let restored_id = match res.kind.family() {
                Kind::Bucket => st
                    .buckets
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::Check => st
                    .checks
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::Dashboard => st
                    .dashboards
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::Label => st
                    .labels
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::NotificationEndpoint => st
                    .endpoints
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::NotificationRule => {
                    let rule = st.rules.get(&res.pkg_name);
                    if let Some(rule) = rule {
                        if let Some(endpoint_assoc) = rule.endpoint_association() {
                            for assoc in res.associations.iter_mut() {
                                if assoc.kind.is(Kind::NotificationEndpoint)
                                    && *assoc != endpoint_assoc
                                {
                                    *assoc = endpoint_assoc.clone();
                                    has_changes = true;
                                }
                            }
                        }
                    }
                    rule.and_then(|r| r.inner.existing.as_ref()).map(|e| e.id)
                }
                Kind::Task => st
                    .tasks
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::Telegraf => st
                    .telegrafs
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                Kind::Variable => st
                    .variables
                    .get(&res.pkg_name)
                    .and_then(|r| r.existing.as_ref())
                    .map(|e| e.id),
                _ => None,
            };

            if let Some(id) = restored_id {
                if res.id != id {
                    res.id = id;
                    has_changes = true;
                }
            }
        }

        if !has_changes {
            return Ok(());
        }

        stack.updated_at = chrono::Utc::now();
        self.store.update_stack(stack).await
    }
}

async fn apply_bucket(svc: &Arc<dyn BucketService>, b: &BucketState) -> Result<Bucket, ServiceError> {
    match b.status {
        StateStatus::Remove => {
            svc.delete_bucket(b.platform_id()).await?;
            b.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed bucket has no prior state"))
        }
        StateStatus::Exists => {
            svc.update_bucket(
                b.platform_id(),
                BucketUpdate {
                    name: Some(b.parsed.identity.name()),
                    description: Some(b.parsed.description.clone()),
                    retention_seconds: Some(b.parsed.retention_seconds),
                },
            )
            .await
        }
        StateStatus::New => svc.create_bucket(b.to_platform()).await,
    }
}

async fn rollback_bucket(
    svc: &Arc<dyn BucketService>,
    b: &BucketState,
) -> Result<Option<Bucket>, ServiceError> {
    match b.status {
        StateStatus::Remove => {
            let existing = b
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed bucket has no prior state"))?;
            svc.create_bucket(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = b
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated bucket has no prior state"))?;
            svc.update_bucket(
                b.platform_id(),
                BucketUpdate {
                    name: Some(existing.name.clone()),
                    description: Some(existing.description.clone()),
                    retention_seconds: Some(existing.retention_seconds),
                },
            )
            .await
            .map(Some)
        }
        StateStatus::New => {
            svc.delete_bucket(b.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_label(svc: &Arc<dyn LabelService>, l: &LabelState) -> Result<Label, ServiceError> {
    match l.status {
        StateStatus::Remove => {
            svc.delete_label(l.platform_id()).await?;
            l.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed label has no prior state"))
        }
        StateStatus::Exists => {
            svc.update_label(
                l.platform_id(),
                LabelUpdate {
                    name: Some(l.parsed.identity.name()),
                    color: Some(l.parsed.color.clone()),
                    description: Some(l.parsed.description.clone()),
                },
            )
            .await
        }
        StateStatus::New => svc.create_label(l.to_platform()).await,
    }
}

async fn rollback_label(
    svc: &Arc<dyn LabelService>,
    l: &LabelState,
) -> Result<Option<Label>, ServiceError> {
    match l.status {
        StateStatus::Remove => {
            let existing = l
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed label has no prior state"))?;
            svc.create_label(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = l
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated label has no prior state"))?;
            svc.update_label(
                l.platform_id(),
                LabelUpdate {
                    name: Some(existing.name.clone()),
                    color: Some(existing.color.clone()),
                    description: Some(existing.description.clone()),
                },
            )
            .await
            .map(Some)
        }
        StateStatus::New => {
            svc.delete_label(l.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_check(svc: &Arc<dyn CheckService>, c: &CheckState) -> Result<Check, ServiceError> {
    match c.status {
        StateStatus::Remove => {
            svc.delete_check(c.platform_id()).await?;
            c.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed check has no prior state"))
        }
        StateStatus::Exists => svc.update_check(c.platform_id(), c.to_platform()).await,
        StateStatus::New => svc.create_check(c.to_platform()).await,
    }
}

async fn rollback_check(
    svc: &Arc<dyn CheckService>,
    c: &CheckState,
) -> Result<Option<Check>, ServiceError> {
    match c.status {
        StateStatus::Remove => {
            let existing = c
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed check has no prior state"))?;
            svc.create_check(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = c
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated check has no prior state"))?;
            svc.update_check(c.platform_id(), existing).await.map(Some)
        }
        StateStatus::New => {
            svc.delete_check(c.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_dashboard(
    svc: &Arc<dyn DashboardService>,
    d: &DashboardState,
) -> Result<Dashboard, ServiceError> {
    match d.status {
        StateStatus::Remove => {
            svc.delete_dashboard(d.platform_id()).await?;
            d.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed dashboard has no prior state"))
        }
        StateStatus::Exists => {
            let desired = d.to_platform();
            svc.update_dashboard(
                d.platform_id(),
                DashboardUpdate {
                    name: Some(desired.name),
                    description: Some(desired.description),
                    cells: Some(desired.cells),
                },
            )
            .await
        }
        StateStatus::New => svc.create_dashboard(d.to_platform()).await,
    }
}

async fn rollback_dashboard(
    svc: &Arc<dyn DashboardService>,
    d: &DashboardState,
) -> Result<Option<Dashboard>, ServiceError> {
    match d.status {
        StateStatus::Remove => {
            let existing = d
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed dashboard has no prior state"))?;
            svc.create_dashboard(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = d
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated dashboard has no prior state"))?;
            svc.update_dashboard(
                d.platform_id(),
                DashboardUpdate {
                    name: Some(existing.name.clone()),
                    description: Some(existing.description.clone()),
                    cells: Some(existing.cells.clone()),
                },
            )
            .await
            .map(Some)
        }
        StateStatus::New => {
            svc.delete_dashboard(d.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_endpoint(
    svc: &Arc<dyn NotificationEndpointService>,
    e: &EndpointState,
) -> Result<NotificationEndpoint, ServiceError> {
    match e.status {
        StateStatus::Remove => {
            svc.delete_endpoint(e.platform_id()).await?;
            e.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed endpoint has no prior state"))
        }
        StateStatus::Exists => svc.update_endpoint(e.platform_id(), e.to_platform()).await,
        StateStatus::New => svc.create_endpoint(e.to_platform()).await,
    }
}

async fn rollback_endpoint(
    svc: &Arc<dyn NotificationEndpointService>,
    e: &EndpointState,
) -> Result<Option<NotificationEndpoint>, ServiceError> {
    match e.status {
        StateStatus::Remove => {
            let existing = e
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed endpoint has no prior state"))?;
            svc.create_endpoint(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = e
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated endpoint has no prior state"))?;
            svc.update_endpoint(e.platform_id(), existing)
                .await
                .map(Some)
        }
        StateStatus::New => {
            svc.delete_endpoint(e.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_rule(
    svc: &Arc<dyn NotificationRuleService>,
    r: &RuleState,
    endpoint_id: PlatformId,
) -> Result<NotificationRule, ServiceError> {
    match r.inner.status {
        StateStatus::Remove => {
            svc.delete_rule(r.platform_id()).await?;
            r.inner
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed rule has no prior state"))
        }
        StateStatus::Exists => {
            svc.update_rule(r.platform_id(), r.to_platform(endpoint_id))
                .await
        }
        StateStatus::New => svc.create_rule(r.to_platform(endpoint_id)).await,
    }
}

async fn rollback_rule(
    svc: &Arc<dyn NotificationRuleService>,
    r: &RuleState,
    endpoint_id: PlatformId,
) -> Result<Option<NotificationRule>, ServiceError> {
    // the rule contract exposes no status read, so a restored rule comes
    // back Inactive
    let restore_from = |existing: &NotificationRule| -> NotificationRule {
        let mut restored = existing.clone();
        restored.endpoint_id = endpoint_id;
        restored.status = Status::Inactive;
        restored
    };

    match r.inner.status {
        StateStatus::Remove => {
            let existing = r
                .inner
                .existing
                .as_ref()
                .ok_or_else(|| ServiceError::internal("removed rule has no prior state"))?;
            if endpoint_id.is_zero() {
                return Err(ServiceError::internal(
                    "failed to find endpoint dependency to roll back notification rule",
                ));
            }
            svc.create_rule(restore_from(existing)).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = r
                .inner
                .existing
                .as_ref()
                .ok_or_else(|| ServiceError::internal("updated rule has no prior state"))?;
            if endpoint_id.is_zero() {
                return Err(ServiceError::internal(
                    "failed to find endpoint dependency to roll back notification rule",
                ));
            }
            svc.update_rule(r.platform_id(), restore_from(existing))
                .await
                .map(Some)
        }
        StateStatus::New => {
            svc.delete_rule(r.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_task(svc: &Arc<dyn TaskService>, t: &TaskState) -> Result<Task, ServiceError> {
    match t.status {
        StateStatus::Remove => {
            svc.delete_task(t.platform_id()).await?;
            t.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed task has no prior state"))
        }
        StateStatus::Exists => {
            let desired = t.to_platform();
            svc.update_task(
                t.platform_id(),
                TaskUpdate {
                    name: Some(desired.name),
                    description: Some(desired.description),
                    status: Some(desired.status),
                    query: Some(desired.query),
                    every_seconds: Some(desired.every_seconds),
                    offset_seconds: Some(desired.offset_seconds),
                    cron: Some(desired.cron),
                },
            )
            .await
        }
        StateStatus::New => svc.create_task(t.to_platform()).await,
    }
}

async fn rollback_task(
    svc: &Arc<dyn TaskService>,
    t: &TaskState,
) -> Result<Option<Task>, ServiceError> {
    match t.status {
        StateStatus::Remove => {
            let existing = t
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed task has no prior state"))?;
            svc.create_task(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = t
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated task has no prior state"))?;
            svc.update_task(
                t.platform_id(),
                TaskUpdate {
                    name: Some(existing.name.clone()),
                    description: Some(existing.description.clone()),
                    status: Some(existing.status),
                    query: Some(existing.query.clone()),
                    every_seconds: Some(existing.every_seconds),
                    offset_seconds: Some(existing.offset_seconds),
                    cron: Some(existing.cron.clone()),
                },
            )
            .await
            .map(Some)
        }
        StateStatus::New => {
            svc.delete_task(t.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_telegraf(
    svc: &Arc<dyn TelegrafService>,
    t: &TelegrafState,
) -> Result<TelegrafConfig, ServiceError> {
    match t.status {
        StateStatus::Remove => {
            svc.delete_telegraf(t.platform_id()).await?;
            t.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed telegraf config has no prior state"))
        }
        StateStatus::Exists => svc.update_telegraf(t.platform_id(), t.to_platform()).await,
        StateStatus::New => svc.create_telegraf(t.to_platform()).await,
    }
}

async fn rollback_telegraf(
    svc: &Arc<dyn TelegrafService>,
    t: &TelegrafState,
) -> Result<Option<TelegrafConfig>, ServiceError> {
    match t.status {
        StateStatus::Remove => {
            let existing = t.existing.clone().ok_or_else(|| {
                ServiceError::internal("removed telegraf config has no prior state")
            })?;
            svc.create_telegraf(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = t.existing.clone().ok_or_else(|| {
                ServiceError::internal("updated telegraf config has no prior state")
            })?;
            svc.update_telegraf(t.platform_id(), existing)
                .await
                .map(Some)
        }
        StateStatus::New => {
            svc.delete_telegraf(t.platform_id()).await?;
            Ok(None)
        }
    }
}

async fn apply_variable(
    svc: &Arc<dyn VariableService>,
    v: &VariableState,
) -> Result<Variable, ServiceError> {
    match v.status {
        StateStatus::Remove => {
            svc.delete_variable(v.platform_id()).await?;
            v.existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed variable has no prior state"))
        }
        StateStatus::Exists => {
            svc.update_variable(
                v.platform_id(),
                VariableUpdate {
                    name: Some(v.parsed.identity.name()),
                    description: Some(v.parsed.description.clone()),
                    arguments: Some(v.parsed.args.clone()),
                },
            )
            .await
        }
        StateStatus::New => svc.create_variable(v.to_platform()).await,
    }
}

async fn rollback_variable(
    svc: &Arc<dyn VariableService>,
    v: &VariableState,
) -> Result<Option<Variable>, ServiceError> {
    match v.status {
        StateStatus::Remove => {
            let existing = v
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("removed variable has no prior state"))?;
            svc.create_variable(existing).await.map(Some)
        }
        StateStatus::Exists => {
            let existing = v
                .existing
                .clone()
                .ok_or_else(|| ServiceError::internal("updated variable has no prior state"))?;
            svc.update_variable(
                v.platform_id(),
                VariableUpdate {
                    name: Some(existing.name.clone()),
                    description: Some(existing.description.clone()),
                    arguments: Some(existing.arguments.clone()),
                },
            )
            .await
            .map(Some)
        }
        StateStatus::New => {
            svc.delete_variable(v.platform_id()).await?;
            Ok(None)
        }
    }
}
