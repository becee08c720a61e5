//! Dry-run engine
//!
//! Read-only probes that enrich the state with what currently exists on the
//! platform. A record found by id or name is promoted NEW→EXISTS; rules are
//! bound to their endpoints; secret references are checked against the
//! org's secret keys; the label-mapping plan is computed. Nothing here
//! mutates the platform.

use std::collections::BTreeMap;

use crate::engine::{ApplyOpts, Engine};
use crate::errors::{EngineError, ServiceResult};
use crate::ids::PlatformId;
use crate::kind::Kind;
use crate::package::{Package, ValidationMode};
use crate::state::{StateCoordinator, StateLabelMapping, StateStatus};

/// Page size used when walking the variable listing.
const VARIABLE_PAGE_LIMIT: usize = 100;

/// Collapses an absorbable probe failure into "resource absent".
fn absorb<T>(res: ServiceResult<T>) -> ServiceResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_absorbable() => Ok(None),
        Err(e) => Err(e),
    }
}

impl Engine {
    pub(crate) async fn dry_run_state(
        &self,
        org_id: PlatformId,
        pkg: &mut Package,
        opts: &ApplyOpts,
    ) -> Result<StateCoordinator, EngineError> {
        // a stack-driven apply may legitimately carry an empty package:
        // it means everything the stack owns goes away
        let mode = if opts.stack_id.is_some() {
            ValidationMode::WithoutResources
        } else {
            ValidationMode::Full
        };
        pkg.validate(mode)
            .map_err(|e| EngineError::Unprocessable(e.to_string()))?;
        pkg.apply_env_refs(&opts.env_refs);

        let mut state = StateCoordinator::new(pkg);

        if let Some(stack_id) = opts.stack_id {
            let stack = self
                .store
                .read_stack(stack_id)
                .await
                .map_err(|e| EngineError::internal(format!("reading stack: {e}")))?;
            state.add_stack_state(&stack);
        }

        self.dry_run_secrets(org_id, &mut state).await?;

        self.dry_run_buckets(org_id, &mut state).await?;
        self.dry_run_checks(org_id, &mut state).await?;
        self.dry_run_dashboards(org_id, &mut state).await?;
        self.dry_run_labels(org_id, &mut state).await?;
        self.dry_run_tasks(org_id, &mut state).await?;
        self.dry_run_telegrafs(org_id, &mut state).await?;
        self.dry_run_variables(org_id, &mut state).await?;
        self.dry_run_endpoints(org_id, &mut state).await?;
        self.dry_run_rules(org_id, &mut state).await?;

        state.label_mappings = self.dry_run_label_mappings(&state).await?;

        Ok(state)
    }

    async fn dry_run_secrets(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        if state.secret_keys.is_empty() {
            return Ok(());
        }

        let existing = self
            .svc
            .secrets
            .list_secret_keys(org_id)
            .await
            .map_err(EngineError::internal)?;
        for key in existing {
            state.mark_found_secret(&key);
        }
        Ok(())
    }

    async fn dry_run_buckets(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for b in state.buckets.values_mut() {
            b.org_id = org_id;
            let existing = if !b.platform_id().is_zero() {
                absorb(self.svc.buckets.find_bucket_by_id(b.platform_id()).await)?
            } else {
                absorb(
                    self.svc
                        .buckets
                        .find_bucket_by_name(org_id, &b.parsed.identity.name())
                        .await,
                )?
            };
            if b.status.is_new() && existing.is_some() {
                b.status = StateStatus::Exists;
            }
            b.existing = existing;
        }
        Ok(())
    }

    async fn dry_run_checks(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for c in state.checks.values_mut() {
            c.org_id = org_id;
            let existing = if !c.platform_id().is_zero() {
                absorb(self.svc.checks.find_check_by_id(c.platform_id()).await)?
            } else {
                absorb(
                    self.svc
                        .checks
                        .find_check_by_name(org_id, &c.parsed.identity.name())
                        .await,
                )?
            };
            if c.status.is_new() && existing.is_some() {
                c.status = StateStatus::Exists;
            }
            c.existing = existing;
        }
        Ok(())
    }

    async fn dry_run_dashboards(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for d in state.dashboards.values_mut() {
            d.org_id = org_id;
            let existing = if !d.platform_id().is_zero() {
                absorb(
                    self.svc
                        .dashboards
                        .find_dashboard_by_id(d.platform_id())
                        .await,
                )?
            } else {
                None
            };
            if d.status.is_new() && existing.is_some() {
                d.status = StateStatus::Exists;
            }
            d.existing = existing;
        }
        Ok(())
    }

    async fn dry_run_labels(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for l in state.labels.values_mut() {
            l.org_id = org_id;
            let existing = if !l.platform_id().is_zero() {
                absorb(self.svc.labels.find_label_by_id(l.platform_id()).await)?
            } else {
                absorb(
                    self.svc
                        .labels
                        .find_label_by_name(org_id, &l.parsed.identity.name())
                        .await,
                )?
            };
            if l.status.is_new() && existing.is_some() {
                l.status = StateStatus::Exists;
            }
            l.existing = existing;
        }
        Ok(())
    }

    async fn dry_run_tasks(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for t in state.tasks.values_mut() {
            t.org_id = org_id;
            let existing = if !t.platform_id().is_zero() {
                absorb(self.svc.tasks.find_task_by_id(t.platform_id()).await)?
            } else {
                None
            };
            if t.status.is_new() && existing.is_some() {
                t.status = StateStatus::Exists;
            }
            t.existing = existing;
        }
        Ok(())
    }

    async fn dry_run_telegrafs(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for t in state.telegrafs.values_mut() {
            t.org_id = org_id;
            let existing = if !t.platform_id().is_zero() {
                absorb(
                    self.svc
                        .telegrafs
                        .find_telegraf_by_id(t.platform_id())
                        .await,
                )?
            } else {
                None
            };
            if t.status.is_new() && existing.is_some() {
                t.status = StateStatus::Exists;
            }
            t.existing = existing;
        }
        Ok(())
    }

    async fn dry_run_variables(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        if state.variables.is_empty() {
            return Ok(());
        }

        let mut existing_vars = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .svc
                .variables
                .find_variables(org_id, VARIABLE_PAGE_LIMIT, offset)
                .await
                .map_err(EngineError::internal)?;
            let page_len = page.len();
            existing_vars.extend(page);
            if page_len < VARIABLE_PAGE_LIMIT {
                break;
            }
            offset += page_len;
        }

        let by_id: BTreeMap<PlatformId, usize> = existing_vars
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id, i))
            .collect();
        let by_name: BTreeMap<&str, usize> = existing_vars
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.as_str(), i))
            .collect();

        for v in state.variables.values_mut() {
            v.org_id = org_id;
            let idx = if !v.platform_id().is_zero() {
                by_id.get(&v.platform_id()).copied()
            } else {
                by_name.get(v.parsed.identity.name().as_str()).copied()
            };
            let existing = idx.map(|i| existing_vars[i].clone());
            if v.status.is_new() && existing.is_some() {
                v.status = StateStatus::Exists;
            }
            v.existing = existing;
        }
        Ok(())
    }

    /// Endpoints use a single bulk list per org instead of N targeted reads.
    async fn dry_run_endpoints(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        if state.endpoints.is_empty() {
            return Ok(());
        }

        let existing_endpoints = self
            .svc
            .endpoints
            .find_endpoints(org_id)
            .await
            .map_err(EngineError::internal)?;

        let by_id: BTreeMap<PlatformId, usize> = existing_endpoints
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        let by_name: BTreeMap<&str, usize> = existing_endpoints
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.as_str(), i))
            .collect();

        for e in state.endpoints.values_mut() {
            e.org_id = org_id;
            let idx = by_id
                .get(&e.platform_id())
                .or_else(|| by_name.get(e.parsed.identity.name().as_str()))
                .copied();
            let existing = idx.map(|i| existing_endpoints[i].clone());
            if e.status.is_new() && existing.is_some() {
                e.status = StateStatus::Exists;
            }
            e.existing = existing;
        }
        Ok(())
    }

    /// Fetches existing rules and binds every live rule to its endpoint.
    /// A rule whose endpoint is in neither the package nor the stack is a
    /// dependency failure.
    async fn dry_run_rules(
        &self,
        org_id: PlatformId,
        state: &mut StateCoordinator,
    ) -> Result<(), EngineError> {
        for r in state.rules.values_mut() {
            r.inner.org_id = org_id;
            if !r.platform_id().is_zero() {
                r.inner.existing = absorb(self.svc.rules.find_rule_by_id(r.platform_id()).await)?;
            }
        }

        let endpoint_names: Vec<String> = state.endpoints.keys().cloned().collect();
        for r in state.rules.values_mut() {
            if r.associated_endpoint.is_some() {
                continue;
            }
            let wanted = r.inner.parsed.endpoint_name.render();
            let found = endpoint_names.iter().any(|n| *n == wanted);
            if !found && !r.inner.status.is_remove() {
                return Err(EngineError::Unprocessable(format!(
                    "failed to find notification endpoint {:?} dependency for notification rule {:?}",
                    wanted,
                    r.inner.parsed.identity.pkg_name()
                )));
            }
            if found {
                r.associated_endpoint = Some(wanted);
            }
        }
        Ok(())
    }

    /// Plans label-mapping work for every live resource: declared mappings
    /// that already exist stay EXISTS, the rest become NEW. Removals were
    /// computed from the stack during reconciliation.
    async fn dry_run_label_mappings(
        &self,
        state: &StateCoordinator,
    ) -> Result<Vec<StateLabelMapping>, EngineError> {
        // display name -> pkg-name of every live state label
        let labels_by_name: BTreeMap<String, String> = state
            .labels
            .iter()
            .filter(|(_, l)| !l.status.is_remove())
            .map(|(pkg, l)| (l.parsed.identity.name(), pkg.clone()))
            .collect();

        let mut targets: Vec<(Kind, String)> = Vec::new();
        let mut collect = |kind: Kind, names: Vec<(&String, StateStatus)>| {
            for (name, status) in names {
                if !status.is_remove() {
                    targets.push((kind, name.clone()));
                }
            }
        };
        collect(
            Kind::Bucket,
            state.buckets.iter().map(|(n, r)| (n, r.status)).collect(),
        );
        collect(
            Kind::Check,
            state.checks.iter().map(|(n, r)| (n, r.status)).collect(),
        );
        collect(
            Kind::Dashboard,
            state
                .dashboards
                .iter()
                .map(|(n, r)| (n, r.status))
                .collect(),
        );
        collect(
            Kind::NotificationEndpoint,
            state.endpoints.iter().map(|(n, r)| (n, r.status)).collect(),
        );
        collect(
            Kind::NotificationRule,
            state
                .rules
                .iter()
                .map(|(n, r)| (n, r.inner.status))
                .collect(),
        );
        collect(
            Kind::Task,
            state.tasks.iter().map(|(n, r)| (n, r.status)).collect(),
        );
        collect(
            Kind::Telegraf,
            state.telegrafs.iter().map(|(n, r)| (n, r.status)).collect(),
        );
        collect(
            Kind::Variable,
            state.variables.iter().map(|(n, r)| (n, r.status)).collect(),
        );

        let mut mappings = Vec::new();
        for (kind, pkg_name) in targets {
            mappings.extend(
                self.mappings_for_resource(state, &labels_by_name, kind, &pkg_name)
                    .await?,
            );
        }
        Ok(mappings)
    }

    async fn mappings_for_resource(
        &self,
        state: &StateCoordinator,
        labels_by_name: &BTreeMap<String, String>,
        kind: Kind,
        pkg_name: &str,
    ) -> Result<Vec<StateLabelMapping>, EngineError> {
        let Some(record) = state.record(kind, pkg_name) else {
            return Ok(Vec::new());
        };
        let ident = record.state_identity();

        // display name -> pkg-name of labels this resource declares
        let mut pending: BTreeMap<String, String> = record
            .label_refs()
            .into_iter()
            .filter_map(|r| {
                let label_pkg = r.render();
                state
                    .get_label(&label_pkg)
                    .map(|l| (l.parsed.identity.name(), label_pkg))
            })
            .collect();

        let mut mappings = Vec::new();

        if !ident.exists() {
            for (_, label_pkg) in pending {
                mappings.push(StateLabelMapping {
                    status: StateStatus::New,
                    resource_kind: kind,
                    resource_pkg_name: pkg_name.to_string(),
                    label_pkg_name: label_pkg,
                });
            }
            return Ok(mappings);
        }

        let existing_labels = self
            .svc
            .labels
            .find_resource_labels(ident.id, ident.resource_type)
            .await
            .map_err(EngineError::Service)?;

        for l in existing_labels {
            pending.remove(&l.name);
            // an existing platform mapping whose label name matches a state
            // label is tracked and kept
            if let Some(label_pkg) = labels_by_name.get(&l.name) {
                mappings.push(StateLabelMapping {
                    status: StateStatus::Exists,
                    resource_kind: kind,
                    resource_pkg_name: pkg_name.to_string(),
                    label_pkg_name: label_pkg.clone(),
                });
            }
        }

        for (_, label_pkg) in pending {
            mappings.push(StateLabelMapping {
                status: StateStatus::New,
                resource_kind: kind,
                resource_pkg_name: pkg_name.to_string(),
                label_pkg_name: label_pkg,
            });
        }

        Ok(mappings)
    }
}
