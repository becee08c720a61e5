//! End-to-end apply scenarios against a mock platform.

mod support;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use support::TestPlatform;
use vela_core::resources::{
    CheckLevel, CheckSpec, EndpointSpec, ParsedBucket, ParsedCheck, ParsedDashboard,
    ParsedEndpoint, ParsedLabel, ParsedRule, ParsedTask, ParsedTelegraf, ParsedVariable,
    VariableArgs,
};
use vela_core::{
    ApplyOpts, Association, CancelToken, Engine, EngineError, Identity, Kind, Object, Package,
    PlatformId, Reference, ResourceSpec, Stack, StackStore, StateStatus,
};
use vela_stack::MemoryStackStore;

const ORG_ID: PlatformId = PlatformId(900);

fn engine(platform: &TestPlatform, store: Arc<MemoryStackStore>) -> Engine {
    Engine::new(store, platform.id_gen(), platform.services())
}

fn bucket_object(pkg_name: &str, labels: &[&str]) -> Object {
    Object::new(ResourceSpec::Bucket(ParsedBucket {
        identity: Identity::named(pkg_name),
        description: "bucket for holding time series".into(),
        retention_seconds: Some(3600),
        associations: labels.iter().map(|l| Association::label(*l)).collect(),
    }))
}

fn label_object(pkg_name: &str) -> Object {
    Object::new(ResourceSpec::Label(ParsedLabel {
        identity: Identity::named(pkg_name),
        color: "#aa00ff".into(),
        description: String::new(),
    }))
}

fn endpoint_object(pkg_name: &str) -> Object {
    Object::new(ResourceSpec::NotificationEndpoint(ParsedEndpoint {
        identity: Identity::named(pkg_name),
        spec: EndpointSpec::Slack {
            url: "https://hooks.example.com/services/x".into(),
            token: Reference::secret("slack-token"),
        },
        description: String::new(),
        status: Default::default(),
        associations: Vec::new(),
    }))
}

fn rule_object(pkg_name: &str, endpoint_pkg_name: &str) -> Object {
    Object::new(ResourceSpec::NotificationRule(ParsedRule {
        identity: Identity::named(pkg_name),
        endpoint_name: Reference::literal(endpoint_pkg_name),
        description: String::new(),
        every_seconds: 600,
        offset_seconds: 0,
        message_template: "notification triggered".into(),
        status: Default::default(),
        status_rules: Vec::new(),
        tag_rules: Vec::new(),
        associations: Vec::new(),
    }))
}

fn labeled_bucket_package() -> Package {
    Package::new(vec![
        bucket_object("rucket_1", &["label_1"]),
        label_object("label_1"),
    ])
}

fn kitchen_sink_package(rule_count: usize) -> Package {
    let mut objects = vec![
        label_object("label_1"),
        bucket_object("rucket_1", &["label_1"]),
        Object::new(ResourceSpec::Check(ParsedCheck {
            identity: Identity::named("check_1"),
            spec: CheckSpec::Deadman {
                level: CheckLevel::Crit,
                time_since_seconds: 90,
                stale_seconds: 600,
                report_zero: false,
            },
            description: String::new(),
            query: "from(bucket: \"rucket_1\") |> range(start: -5m)".into(),
            every_seconds: 300,
            offset_seconds: 0,
            status_message_template: String::new(),
            status: Default::default(),
            associations: Vec::new(),
        })),
        Object::new(ResourceSpec::Dashboard(ParsedDashboard {
            identity: Identity::named("dash_1"),
            description: String::new(),
            charts: Vec::new(),
            associations: Vec::new(),
        })),
        endpoint_object("endpoint_1"),
        Object::new(ResourceSpec::Task(ParsedTask {
            identity: Identity::named("task_1"),
            description: String::new(),
            query: "option task = {every: 1h}".into(),
            every_seconds: Some(3600),
            offset_seconds: 0,
            cron: None,
            status: Default::default(),
            associations: Vec::new(),
        })),
        Object::new(ResourceSpec::Telegraf(ParsedTelegraf {
            identity: Identity::named("tele_1"),
            description: String::new(),
            config: "[agent]\n  interval = \"10s\"".into(),
            associations: Vec::new(),
        })),
        Object::new(ResourceSpec::Variable(ParsedVariable {
            identity: Identity::named("var_1"),
            description: String::new(),
            args: VariableArgs::Constant {
                values: vec!["a".into(), "b".into()],
            },
            associations: Vec::new(),
        })),
    ];
    for i in 1..=rule_count {
        objects.push(rule_object(&format!("rule_{i}"), "endpoint_1"));
    }
    Package::new(objects)
}

#[tokio::test]
async fn apply_creates_bucket_label_and_mapping() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = labeled_bucket_package();
    let (summary, _) = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();

    assert_eq!(summary.buckets.len(), 1);
    assert!(!summary.buckets[0].id.is_zero());
    assert_eq!(summary.labels.len(), 1);
    assert!(!summary.labels[0].id.is_zero());
    assert_eq!(summary.label_mappings.len(), 1);
    assert_eq!(summary.label_mappings[0].status, StateStatus::New);

    assert_eq!(platform.buckets.store.lock().unwrap().len(), 1);
    assert_eq!(platform.labels.store.lock().unwrap().len(), 1);
    let mappings = platform.labels.mappings.lock().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].label_id, summary.labels[0].id);
    assert_eq!(mappings[0].resource_id, summary.buckets[0].id);
}

#[tokio::test]
async fn second_apply_is_a_no_op() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = labeled_bucket_package();
    let (first, _) = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();

    let creates_after_first = platform.total_creates();
    let mapping_creates_after_first = platform.labels.mapping_creates.load(Ordering::SeqCst);

    let mut pkg = labeled_bucket_package();
    let (second, _) = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();

    assert_eq!(second.buckets[0].id, first.buckets[0].id);
    assert_eq!(second.labels[0].id, first.labels[0].id);
    assert_eq!(platform.total_creates(), creates_after_first);
    assert_eq!(
        platform.labels.mapping_creates.load(Ordering::SeqCst),
        mapping_creates_after_first
    );
    assert_eq!(platform.buckets.calls.deletes(), 0);
    assert_eq!(platform.labels.calls.deletes(), 0);
}

#[tokio::test]
async fn update_keeps_id_and_renames() {
    let platform = TestPlatform::new();
    let store = Arc::new(MemoryStackStore::new());
    let engine = engine(&platform, Arc::clone(&store));

    // the stack carries identity across the rename; name-based discovery
    // alone cannot follow it
    let stack = engine
        .init_stack(Stack::new(ORG_ID, "test-stack"))
        .await
        .unwrap();
    let opts = ApplyOpts::default().with_stack_id(stack.id);

    let mut pkg = labeled_bucket_package();
    let (first, _) = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    let mut renamed = bucket_object("rucket_1", &["label_1"]);
    if let ResourceSpec::Bucket(b) = &mut renamed.spec {
        b.identity.display_name = Some(Reference::literal("new name"));
    }
    let mut pkg = Package::new(vec![renamed, label_object("label_1")]);
    let (second, _) = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    assert_eq!(second.buckets[0].id, first.buckets[0].id);
    assert_eq!(second.buckets[0].name, "new name");

    let store = platform.buckets.store.lock().unwrap();
    assert!(store.iter().any(|b| b.name == "new name"));
    assert!(!store.iter().any(|b| b.name == "rucket_1"));
}

#[tokio::test]
async fn stack_apply_then_empty_package_removes_everything() {
    let platform = TestPlatform::new();
    let store = Arc::new(MemoryStackStore::new());
    let engine = engine(&platform, Arc::clone(&store));

    let stack = engine
        .init_stack(Stack::new(ORG_ID, "test-stack"))
        .await
        .unwrap();
    let opts = ApplyOpts::default().with_stack_id(stack.id);

    let mut pkg = labeled_bucket_package();
    engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    let recorded = store.read_stack(stack.id).await.unwrap();
    assert_eq!(recorded.resources.len(), 2);

    let mut empty = Package::default();
    engine.apply(ORG_ID, &mut empty, &opts).await.unwrap();

    assert!(platform.buckets.store.lock().unwrap().is_empty());
    assert!(platform.labels.store.lock().unwrap().is_empty());
    let recorded = store.read_stack(stack.id).await.unwrap();
    assert!(recorded.resources.is_empty());
}

#[tokio::test]
async fn stack_records_resources_and_associations() {
    let platform = TestPlatform::new();
    let store = Arc::new(MemoryStackStore::new());
    let engine = engine(&platform, Arc::clone(&store));

    let stack = engine
        .init_stack(Stack::new(ORG_ID, "test-stack"))
        .await
        .unwrap();
    let opts = ApplyOpts::default().with_stack_id(stack.id);

    let mut pkg = Package::new(vec![
        bucket_object("rucket_1", &["label_1"]),
        label_object("label_1"),
        endpoint_object("endpoint_1"),
        rule_object("rule_1", "endpoint_1"),
    ]);
    let (summary, _) = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    let recorded = store.read_stack(stack.id).await.unwrap();
    assert_eq!(recorded.resources.len(), 4);

    let bucket = recorded.find_resource(Kind::Bucket, "rucket_1").unwrap();
    assert_eq!(bucket.id, summary.buckets[0].id);
    assert_eq!(bucket.associations.len(), 1);
    assert_eq!(bucket.associations[0].pkg_name, "label_1");

    let rule = recorded
        .find_resource(Kind::NotificationRule, "rule_1")
        .unwrap();
    assert!(rule
        .associations
        .iter()
        .any(|a| a.kind.is(Kind::NotificationEndpoint) && a.pkg_name == "endpoint_1"));
}

#[tokio::test]
async fn rule_failure_rolls_back_the_entire_package() {
    let platform = TestPlatform::new();
    platform.rules.fail_create_on.store(3, Ordering::SeqCst);
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = kitchen_sink_package(3);
    let err = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Apply(_)));

    assert!(platform.is_empty(), "rollback must leave the platform clean");
}

#[tokio::test]
async fn update_failure_restores_previous_state() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = labeled_bucket_package();
    engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();

    // re-apply with a changed description plus a rule rigged to fail, so the
    // bucket update commits and is then compensated
    platform.rules.fail_create_on.store(1, Ordering::SeqCst);
    let mut changed_bucket = bucket_object("rucket_1", &["label_1"]);
    if let ResourceSpec::Bucket(b) = &mut changed_bucket.spec {
        b.description = "changed".into();
    }
    let mut pkg = Package::new(vec![
        changed_bucket,
        label_object("label_1"),
        endpoint_object("endpoint_1"),
        rule_object("rule_1", "endpoint_1"),
    ]);
    let err = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Apply(_)));

    let store = platform.buckets.store.lock().unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store[0].description, "bucket for holding time series");
    // the rigged endpoint create was rolled back too
    assert!(platform.endpoints.store.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rule_binds_to_its_endpoint() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = Package::new(vec![
        endpoint_object("endpoint_1"),
        rule_object("rule_1", "endpoint_1"),
    ]);
    let (summary, _) = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();

    let endpoint_id = summary.notification_endpoints[0].id;
    assert!(!endpoint_id.is_zero());
    assert_eq!(summary.notification_rules[0].endpoint_id, endpoint_id);
    assert_eq!(
        summary.notification_rules[0].endpoint_pkg_name,
        "endpoint_1"
    );

    let rules = platform.rules.store.lock().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].endpoint_id, endpoint_id);
}

#[tokio::test]
async fn rule_without_endpoint_is_unprocessable() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = Package::new(vec![rule_object("rule_1", "endpoint_unknown")]);
    let err = engine
        .apply(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unprocessable(_)));
    assert_eq!(platform.total_creates(), 0);
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = kitchen_sink_package(1);
    let (summary, diff) = engine
        .dry_run(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();

    assert_eq!(platform.total_creates(), 0);
    assert!(platform.is_empty());

    assert_eq!(summary.buckets.len(), 1);
    assert!(summary.buckets[0].id.is_zero());
    assert_eq!(diff.buckets.len(), 1);
    assert_eq!(diff.buckets[0].identifier.status, StateStatus::New);
    assert!(diff.buckets[0].old.is_none());
    // the package references a secret the platform does not hold
    assert_eq!(summary.missing_secrets, vec!["slack-token".to_string()]);
}

#[tokio::test]
async fn provided_secrets_are_put_and_reported_satisfied() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut pkg = Package::new(vec![endpoint_object("endpoint_1")]);
    let opts = ApplyOpts::default().with_secrets(HashMap::from([(
        "slack-token".to_string(),
        "very-secret".to_string(),
    )]));
    let (summary, _) = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    assert!(summary.missing_secrets.is_empty());
    let secrets = platform.secrets.store.lock().unwrap();
    assert_eq!(
        secrets.get(&ORG_ID).and_then(|m| m.get("slack-token")),
        Some(&"very-secret".to_string())
    );
}

#[tokio::test]
async fn env_refs_resolve_names_and_report_missing() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let mut bucket = bucket_object("ignored", &[]);
    if let ResourceSpec::Bucket(b) = &mut bucket.spec {
        b.identity.name = Reference::env("bkt-name");
    }
    let mut pkg = Package::new(vec![bucket]);

    let opts = ApplyOpts::default()
        .with_env_refs(HashMap::from([("bkt-name".to_string(), "rucket_9".to_string())]));
    let (summary, _) = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    assert_eq!(summary.buckets[0].pkg_name, "rucket_9");
    assert!(summary.missing_envs.is_empty());

    let mut bucket = bucket_object("ignored", &[]);
    if let ResourceSpec::Bucket(b) = &mut bucket.spec {
        b.identity.name = Reference::env("other-name");
    }
    let mut pkg = Package::new(vec![bucket]);
    let (summary, _) = engine
        .dry_run(ORG_ID, &mut pkg, &ApplyOpts::default())
        .await
        .unwrap();
    assert_eq!(summary.missing_envs, vec!["other-name".to_string()]);
}

#[tokio::test]
async fn cancelled_apply_returns_without_rollback() {
    let platform = TestPlatform::new();
    let engine = engine(&platform, Arc::new(MemoryStackStore::new()));

    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = ApplyOpts::default().with_cancel(cancel);

    let mut pkg = labeled_bucket_package();
    let err = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    assert_eq!(platform.total_creates(), 0);
    assert_eq!(platform.buckets.calls.deletes(), 0);
    assert_eq!(platform.labels.calls.deletes(), 0);
}

#[tokio::test]
async fn dropped_label_association_is_unmapped_on_next_apply() {
    let platform = TestPlatform::new();
    let store = Arc::new(MemoryStackStore::new());
    let engine = engine(&platform, Arc::clone(&store));

    let stack = engine
        .init_stack(Stack::new(ORG_ID, "test-stack"))
        .await
        .unwrap();
    let opts = ApplyOpts::default().with_stack_id(stack.id);

    let mut pkg = labeled_bucket_package();
    engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();
    assert_eq!(platform.labels.mappings.lock().unwrap().len(), 1);

    // same resources, association dropped
    let mut pkg = Package::new(vec![
        bucket_object("rucket_1", &[]),
        label_object("label_1"),
    ]);
    engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    assert!(platform.labels.mappings.lock().unwrap().is_empty());
    assert_eq!(platform.buckets.store.lock().unwrap().len(), 1);
    assert_eq!(platform.labels.store.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rollback_of_removal_restores_resource_and_repoints_stack() {
    let platform = TestPlatform::new();
    let store = Arc::new(MemoryStackStore::new());
    let engine = engine(&platform, Arc::clone(&store));

    let stack = engine
        .init_stack(Stack::new(ORG_ID, "test-stack"))
        .await
        .unwrap();
    let opts = ApplyOpts::default().with_stack_id(stack.id);

    let mut pkg = Package::new(vec![
        bucket_object("rucket_1", &[]),
        endpoint_object("endpoint_1"),
        rule_object("rule_1", "endpoint_1"),
    ]);
    engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap();

    // next package drops the bucket (scheduling its removal) and brings a
    // new rule whose create is rigged to fail; the first apply already
    // consumed one create call
    platform.rules.fail_create_on.store(2, Ordering::SeqCst);
    let mut pkg = Package::new(vec![
        endpoint_object("endpoint_1"),
        rule_object("rule_1", "endpoint_1"),
        rule_object("rule_2", "endpoint_1"),
    ]);
    let err = engine.apply(ORG_ID, &mut pkg, &opts).await.unwrap_err();
    assert!(matches!(err, EngineError::Apply(_)));

    // the deleted bucket came back under a fresh id and the stack follows it
    let buckets = platform.buckets.store.lock().unwrap();
    assert_eq!(buckets.len(), 1);
    let recorded = store.read_stack(stack.id).await.unwrap();
    let entry = recorded.find_resource(Kind::Bucket, "rucket_1").unwrap();
    assert_eq!(entry.id, buckets[0].id);
}
