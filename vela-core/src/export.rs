//! Exporter
//!
//! Reads resources back from the platform and emits a package object graph
//! with platform ids stripped, so the output round-trips through apply as
//! NEW. Labels associated with an exported resource ride along, and a rule
//! always brings its endpoint.

use std::collections::BTreeSet;

use crate::engine::Engine;
use crate::errors::EngineError;
use crate::ids::PlatformId;
use crate::kind::Kind;
use crate::package::{
    Association, Identity, Object, Package, Reference, ResourceSpec, ValidationMode,
};
use crate::platform::{
    Check, Dashboard, EndpointPayload, Label, NotificationEndpoint, NotificationRule, Task,
};
use crate::resources::{
    Chart, EndpointSpec, HttpAuth, ParsedBucket, ParsedCheck, ParsedDashboard, ParsedEndpoint,
    ParsedLabel, ParsedRule, ParsedTask, ParsedTelegraf, ParsedVariable,
};

/// Export everything in an org, optionally narrowed by resource kinds
/// and/or label names.
#[derive(Debug, Clone)]
pub struct ExportByOrg {
    pub org_id: PlatformId,
    /// When non-empty, only resources carrying at least one of these labels
    /// (and the labels themselves) are emitted.
    pub label_names: Vec<String>,
    /// When non-empty, only these kinds are walked.
    pub resource_kinds: Vec<Kind>,
}

impl ExportByOrg {
    pub fn new(org_id: PlatformId) -> Self {
        Self {
            org_id,
            label_names: Vec::new(),
            resource_kinds: Vec::new(),
        }
    }
}

/// An explicit resource to export, optionally renamed in the output.
#[derive(Debug, Clone)]
pub struct ResourceToExport {
    pub kind: Kind,
    pub id: PlatformId,
    pub name: Option<String>,
}

/// Inputs to [`Engine::create_package`].
#[derive(Debug, Clone, Default)]
pub struct CreateOpts {
    pub org_ids: Vec<ExportByOrg>,
    pub resources: Vec<ResourceToExport>,
}

impl Engine {
    /// Produces a package from existing platform resources.
    pub async fn create_package(&self, opts: CreateOpts) -> Result<Package, EngineError> {
        let mut exporter = ResourceExporter::new(self);

        for org in &opts.org_ids {
            let resources = self.collect_org_resources(org).await?;
            exporter.export(&resources, &org.label_names).await?;
        }
        exporter.export(&opts.resources, &[]).await?;

        let pkg = Package::new(exporter.objects);
        pkg.validate(ValidationMode::WithoutResources)
            .map_err(|e| EngineError::Unprocessable(e.to_string()))?;
        Ok(pkg)
    }

    async fn collect_org_resources(
        &self,
        org: &ExportByOrg,
    ) -> Result<Vec<ResourceToExport>, EngineError> {
        let all_kinds = [
            Kind::Bucket,
            Kind::Check,
            Kind::Dashboard,
            Kind::Label,
            Kind::NotificationEndpoint,
            Kind::NotificationRule,
            Kind::Task,
            Kind::Telegraf,
            Kind::Variable,
        ];
        let mut wanted: Vec<Kind> = if org.resource_kinds.is_empty() {
            all_kinds.to_vec()
        } else {
            let mut seen = BTreeSet::new();
            org.resource_kinds
                .iter()
                .map(|k| k.family())
                .filter(|k| seen.insert(*k))
                .collect()
        };
        wanted.sort();

        let mut resources = Vec::new();
        for kind in wanted {
            match kind {
                Kind::Bucket => {
                    for b in self
                        .svc
                        .buckets
                        .find_buckets(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::Bucket,
                            id: b.id,
                            name: None,
                        });
                    }
                }
                Kind::Check => {
                    for c in self
                        .svc
                        .checks
                        .find_checks(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::Check,
                            id: c.id,
                            name: None,
                        });
                    }
                }
                Kind::Dashboard => {
                    for d in self
                        .svc
                        .dashboards
                        .find_dashboards(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::Dashboard,
                            id: d.id,
                            name: None,
                        });
                    }
                }
                Kind::Label => {
                    for l in self
                        .svc
                        .labels
                        .find_labels(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::Label,
                            id: l.id,
                            name: None,
                        });
                    }
                }
                Kind::NotificationEndpoint => {
                    for e in self
                        .svc
                        .endpoints
                        .find_endpoints(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::NotificationEndpoint,
                            id: e.id,
                            name: None,
                        });
                    }
                }
                Kind::NotificationRule => {
                    for r in self
                        .svc
                        .rules
                        .find_rules(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::NotificationRule,
                            id: r.id,
                            name: None,
                        });
                    }
                }
                Kind::Task => {
                    resources.extend(self.collect_org_tasks(org.org_id).await?);
                }
                Kind::Telegraf => {
                    for t in self
                        .svc
                        .telegrafs
                        .find_telegrafs(org.org_id)
                        .await
                        .map_err(EngineError::internal)?
                    {
                        resources.push(ResourceToExport {
                            kind: Kind::Telegraf,
                            id: t.id,
                            name: None,
                        });
                    }
                }
                Kind::Variable => {
                    let mut offset = 0;
                    loop {
                        let page = self
                            .svc
                            .variables
                            .find_variables(org.org_id, 100, offset)
                            .await
                            .map_err(EngineError::internal)?;
                        let page_len = page.len();
                        for v in page {
                            resources.push(ResourceToExport {
                                kind: Kind::Variable,
                                id: v.id,
                                name: None,
                            });
                        }
                        if page_len < 100 {
                            break;
                        }
                        offset += page_len;
                    }
                }
                _ => {}
            }
        }
        Ok(resources)
    }

    /// Tasks whose id backs a check or a notification rule are system-owned
    /// and skipped.
    async fn collect_org_tasks(
        &self,
        org_id: PlatformId,
    ) -> Result<Vec<ResourceToExport>, EngineError> {
        let tasks = self
            .svc
            .tasks
            .find_tasks(org_id)
            .await
            .map_err(EngineError::internal)?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let checks = self
            .svc
            .checks
            .find_checks(org_id)
            .await
            .map_err(EngineError::internal)?;
        let rules = self
            .svc
            .rules
            .find_rules(org_id)
            .await
            .map_err(EngineError::internal)?;

        let mut owned: BTreeSet<PlatformId> = BTreeSet::new();
        owned.extend(checks.iter().map(|c| c.task_id));
        owned.extend(rules.iter().map(|r| r.task_id));

        Ok(tasks
            .into_iter()
            .filter(|t| !owned.contains(&t.id))
            .map(|t| ResourceToExport {
                kind: Kind::Task,
                id: t.id,
                name: None,
            })
            .collect())
    }
}

struct ResourceExporter<'a> {
    engine: &'a Engine,
    objects: Vec<Object>,
    seen: BTreeSet<(Kind, String)>,
}

impl<'a> ResourceExporter<'a> {
    fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            objects: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    async fn export(
        &mut self,
        resources: &[ResourceToExport],
        label_filter: &[String],
    ) -> Result<(), EngineError> {
        for r in resources {
            self.export_resource(r, label_filter).await?;
        }
        Ok(())
    }

    async fn export_resource(
        &mut self,
        r: &ResourceToExport,
        label_filter: &[String],
    ) -> Result<(), EngineError> {
        let svc = &self.engine.svc;
        match r.kind.family() {
            Kind::Label => {
                let label = svc
                    .labels
                    .find_label_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                if !label_filter.is_empty() && !label_filter.contains(&label.name) {
                    return Ok(());
                }
                self.push_label(&label, r.name.clone());
            }
            Kind::Bucket => {
                let bucket = svc
                    .buckets
                    .find_bucket_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::Bucket, label_filter)
                    .await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::Bucket,
                    pkg_name(&bucket.name, &r.name),
                    ResourceSpec::Bucket(ParsedBucket {
                        identity: identity(&bucket.name, &r.name),
                        description: bucket.description,
                        retention_seconds: bucket.retention_seconds,
                        associations,
                    }),
                );
            }
            Kind::Check => {
                let check = svc
                    .checks
                    .find_check_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::Check, label_filter)
                    .await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::Check,
                    pkg_name(&check.name, &r.name),
                    ResourceSpec::Check(check_to_parsed(&check, &r.name, associations)),
                );
            }
            Kind::Dashboard => {
                let dash = svc
                    .dashboards
                    .find_dashboard_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::Dashboard, label_filter)
                    .await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::Dashboard,
                    pkg_name(&dash.name, &r.name),
                    ResourceSpec::Dashboard(dashboard_to_parsed(&dash, &r.name, associations)),
                );
            }
            Kind::NotificationEndpoint => {
                let endpoint = svc
                    .endpoints
                    .find_endpoint_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::NotificationEndpoint, label_filter)
                    .await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_endpoint(&endpoint, r.name.clone(), associations);
            }
            Kind::NotificationRule => {
                let rule = svc
                    .rules
                    .find_rule_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::NotificationRule, label_filter)
                    .await?
                else {
                    return Ok(());
                };

                // the rule's endpoint dependency is always emitted alongside
                let endpoint = svc
                    .endpoints
                    .find_endpoint_by_id(rule.endpoint_id)
                    .await
                    .map_err(EngineError::internal)?;
                self.push_endpoint(&endpoint, None, Vec::new());

                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::NotificationRule,
                    pkg_name(&rule.name, &r.name),
                    ResourceSpec::NotificationRule(rule_to_parsed(
                        &rule,
                        &endpoint.name,
                        &r.name,
                        associations,
                    )),
                );
            }
            Kind::Task => {
                let task = svc
                    .tasks
                    .find_task_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self.resource_labels(r.id, Kind::Task, label_filter).await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::Task,
                    pkg_name(&task.name, &r.name),
                    ResourceSpec::Task(task_to_parsed(&task, &r.name, associations)),
                );
            }
            Kind::Telegraf => {
                let tele = svc
                    .telegrafs
                    .find_telegraf_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::Telegraf, label_filter)
                    .await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::Telegraf,
                    pkg_name(&tele.name, &r.name),
                    ResourceSpec::Telegraf(ParsedTelegraf {
                        identity: identity(&tele.name, &r.name),
                        description: tele.description,
                        config: tele.config,
                        associations,
                    }),
                );
            }
            Kind::Variable => {
                let var = svc
                    .variables
                    .find_variable_by_id(r.id)
                    .await
                    .map_err(EngineError::internal)?;
                let Some(labels) = self
                    .resource_labels(r.id, Kind::Variable, label_filter)
                    .await?
                else {
                    return Ok(());
                };
                let associations = self.push_labels(&labels);
                self.push_object(
                    Kind::Variable,
                    pkg_name(&var.name, &r.name),
                    ResourceSpec::Variable(ParsedVariable {
                        identity: identity(&var.name, &r.name),
                        description: var.description,
                        args: var.arguments,
                        associations,
                    }),
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Labels on the resource, or `None` when a non-empty filter excludes
    /// the resource entirely.
    async fn resource_labels(
        &self,
        id: PlatformId,
        kind: Kind,
        label_filter: &[String],
    ) -> Result<Option<Vec<Label>>, EngineError> {
        let labels = self
            .engine
            .svc
            .labels
            .find_resource_labels(id, kind.resource_type())
            .await
            .map_err(EngineError::internal)?;

        if !label_filter.is_empty() && !labels.iter().any(|l| label_filter.contains(&l.name)) {
            return Ok(None);
        }
        Ok(Some(labels))
    }

    /// Emits each label once and returns the association entries for the
    /// carrying resource.
    fn push_labels(&mut self, labels: &[Label]) -> Vec<Association> {
        let mut associations = Vec::with_capacity(labels.len());
        for l in labels {
            self.push_label(l, None);
            associations.push(Association::label(l.name.clone()));
        }
        associations
    }

    fn push_label(&mut self, label: &Label, rename: Option<String>) {
        let name = rename.unwrap_or_else(|| label.name.clone());
        self.push_object(
            Kind::Label,
            name.clone(),
            ResourceSpec::Label(ParsedLabel {
                identity: Identity::named(name),
                color: label.color.clone(),
                description: label.description.clone(),
            }),
        );
    }

    fn push_endpoint(
        &mut self,
        endpoint: &NotificationEndpoint,
        rename: Option<String>,
        associations: Vec<Association>,
    ) {
        let name = rename.unwrap_or_else(|| endpoint.name.clone());
        self.push_object(
            Kind::NotificationEndpoint,
            name.clone(),
            ResourceSpec::NotificationEndpoint(endpoint_to_parsed(endpoint, name, associations)),
        );
    }

    fn push_object(&mut self, kind: Kind, pkg_name: String, spec: ResourceSpec) {
        if self.seen.insert((kind.family(), pkg_name)) {
            self.objects.push(Object::new(spec));
        }
    }
}

fn pkg_name(platform_name: &str, rename: &Option<String>) -> String {
    rename.clone().unwrap_or_else(|| platform_name.to_string())
}

fn identity(platform_name: &str, rename: &Option<String>) -> Identity {
    Identity::named(pkg_name(platform_name, rename))
}

fn check_to_parsed(check: &Check, rename: &Option<String>, associations: Vec<Association>) -> ParsedCheck {
    ParsedCheck {
        identity: identity(&check.name, rename),
        spec: check.spec.clone(),
        description: check.description.clone(),
        query: check.query.clone(),
        every_seconds: check.every_seconds,
        offset_seconds: check.offset_seconds,
        status_message_template: check.status_message_template.clone(),
        status: check.status,
        associations,
    }
}

fn dashboard_to_parsed(
    dash: &Dashboard,
    rename: &Option<String>,
    associations: Vec<Association>,
) -> ParsedDashboard {
    ParsedDashboard {
        identity: identity(&dash.name, rename),
        description: dash.description.clone(),
        charts: dash
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
        associations,
    }
}

/// Secret-bearing fields are exported as secretRefs keyed
/// `{endpoint-id}-{field}` so values never leave the platform.
fn endpoint_to_parsed(
    endpoint: &NotificationEndpoint,
    name: String,
    associations: Vec<Association>,
) -> ParsedEndpoint {
    let secret_ref = |field: &str| Reference::secret(format!("{}-{}", endpoint.id, field));

    let spec = match &endpoint.spec {
        EndpointPayload::Http {
            method,
            url,
            username_secret,
            password_secret,
            token_secret,
        } => {
            let auth = if token_secret.is_some() {
                HttpAuth::Bearer {
                    token: secret_ref("token"),
                }
            } else if username_secret.is_some() || password_secret.is_some() {
                HttpAuth::Basic {
                    username: secret_ref("username"),
                    password: secret_ref("password"),
                }
            } else {
                HttpAuth::None
            };
            EndpointSpec::Http {
                method: method.clone(),
                url: url.clone(),
                auth,
            }
        }
        EndpointPayload::PagerDuty { client_url, .. } => EndpointSpec::PagerDuty {
            client_url: client_url.clone(),
            routing_key: secret_ref("routing-key"),
        },
        EndpointPayload::Slack { url, .. } => EndpointSpec::Slack {
            url: url.clone(),
            token: secret_ref("token"),
        },
    };

    ParsedEndpoint {
        identity: Identity::named(name),
        spec,
        description: endpoint.description.clone(),
        status: endpoint.status,
        associations,
    }
}

fn rule_to_parsed(
    rule: &NotificationRule,
    endpoint_pkg_name: &str,
    rename: &Option<String>,
    associations: Vec<Association>,
) -> ParsedRule {
    ParsedRule {
        identity: identity(&rule.name, rename),
        endpoint_name: Reference::literal(endpoint_pkg_name),
        description: rule.description.clone(),
        every_seconds: rule.every_seconds,
        offset_seconds: rule.offset_seconds,
        message_template: rule.message_template.clone(),
        status: rule.status,
        status_rules: rule.status_rules.clone(),
        tag_rules: rule.tag_rules.clone(),
        associations,
    }
}

fn task_to_parsed(task: &Task, rename: &Option<String>, associations: Vec<Association>) -> ParsedTask {
    ParsedTask {
        identity: identity(&task.name, rename),
        description: task.description.clone(),
        query: task.query.clone(),
        every_seconds: task.every_seconds,
        offset_seconds: task.offset_seconds,
        cron: task.cron.clone(),
        status: task.status,
        associations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_export_synthesizes_secret_refs() {
        let endpoint = NotificationEndpoint {
            id: PlatformId(0xab),
            org_id: PlatformId(1),
            name: "endpoint_1".into(),
            description: String::new(),
            status: crate::resources::Status::Active,
            spec: EndpointPayload::Slack {
                url: "https://hooks.example.com".into(),
                token_secret: "platform-key".into(),
            },
        };

        let parsed = endpoint_to_parsed(&endpoint, "endpoint_1".into(), Vec::new());
        match parsed.spec {
            EndpointSpec::Slack { token, .. } => {
                assert_eq!(token.secret_key(), Some("00000000000000ab-token"))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn rename_overrides_pkg_name() {
        assert_eq!(pkg_name("original", &Some("renamed".into())), "renamed");
        assert_eq!(pkg_name("original", &None), "original");
    }
}
