//! Engine - entry points for dry-run, apply and export
//!
//! The engine owns nothing but the service contracts it was handed; every
//! platform touch goes through them. Dry-run is read-only; apply reconciles
//! and rewrites the stack; a failure mid-apply compensates every committed
//! change before returning.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::diff::Diff;
use crate::errors::{EngineError, ServiceError};
use crate::ids::{IdGenerator, PlatformId};
use crate::package::Package;
use crate::services::{
    BucketService, CheckService, DashboardService, LabelService, NotificationEndpointService,
    NotificationRuleService, SecretService, TaskService, TelegrafService, VariableService,
};
use crate::stack::{Stack, StackStore};
use crate::summary::Summary;

/// Default width of the per-stage worker pool.
pub const DEFAULT_APPLY_LIMIT: usize = 5;

/// The resource service set the engine reconciles through.
#[derive(Clone)]
pub struct Services {
    pub buckets: Arc<dyn BucketService>,
    pub checks: Arc<dyn CheckService>,
    pub dashboards: Arc<dyn DashboardService>,
    pub labels: Arc<dyn LabelService>,
    pub endpoints: Arc<dyn NotificationEndpointService>,
    pub rules: Arc<dyn NotificationRuleService>,
    pub tasks: Arc<dyn TaskService>,
    pub telegrafs: Arc<dyn TelegrafService>,
    pub variables: Arc<dyn VariableService>,
    pub secrets: Arc<dyn SecretService>,
}

/// Options for a dry-run or apply.
#[derive(Clone, Default)]
pub struct ApplyOpts {
    /// Values substituted into envRefs before reconciliation.
    pub env_refs: HashMap<String, String>,
    /// Secret values put to the platform during apply. Only keys are ever
    /// reported back.
    pub secrets: HashMap<String, String>,
    /// Stack to reconcile against and rewrite afterwards.
    pub stack_id: Option<PlatformId>,
    pub cancel: CancelToken,
}

impl ApplyOpts {
    pub fn with_env_refs(mut self, env_refs: HashMap<String, String>) -> Self {
        self.env_refs = env_refs;
        self
    }

    pub fn with_secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_stack_id(mut self, stack_id: PlatformId) -> Self {
        self.stack_id = Some(stack_id);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The package engine.
pub struct Engine {
    pub(crate) svc: Services,
    pub(crate) store: Arc<dyn StackStore>,
    pub(crate) id_gen: Arc<dyn IdGenerator>,
    pub(crate) apply_limit: usize,
}

impl Engine {
    pub fn new(store: Arc<dyn StackStore>, id_gen: Arc<dyn IdGenerator>, svc: Services) -> Self {
        Self {
            svc,
            store,
            id_gen,
            apply_limit: DEFAULT_APPLY_LIMIT,
        }
    }

    /// Bounds per-stage concurrency during apply.
    pub fn with_apply_limit(mut self, limit: usize) -> Self {
        self.apply_limit = limit.max(1);
        self
    }

    /// Creates a new stack record for the org, stamping id and timestamps.
    pub async fn init_stack(&self, mut stack: Stack) -> Result<Stack, EngineError> {
        for url in &stack.urls {
            if url.trim().is_empty() {
                return Err(EngineError::Unprocessable(format!(
                    "url invalid for entry {url:?}"
                )));
            }
        }

        stack.id = self.id_gen.next_id();
        let now = chrono::Utc::now();
        stack.created_at = now;
        stack.updated_at = now;

        self.store
            .create_stack(stack.clone())
            .await
            .map_err(|e| EngineError::Service(ServiceError::internal(e)))?;
        Ok(stack)
    }

    /// Computes the plan for applying `pkg` without any platform side
    /// effects. The package is mutated only by envRef substitution.
    pub async fn dry_run(
        &self,
        org_id: PlatformId,
        pkg: &mut Package,
        opts: &ApplyOpts,
    ) -> Result<(Summary, Diff), EngineError> {
        let state = self.dry_run_state(org_id, pkg, opts).await?;
        Ok((state.summary(), state.diff()))
    }

    /// Applies the package in its entirety. A failure midway rolls every
    /// committed change back and reconciles the stack with whatever
    /// actually persists.
    pub async fn apply(
        &self,
        org_id: PlatformId,
        pkg: &mut Package,
        opts: &ApplyOpts,
    ) -> Result<(Summary, Diff), EngineError> {
        let state = self.dry_run_state(org_id, pkg, opts).await?;
        self.apply_state(org_id, state, opts).await
    }
}
