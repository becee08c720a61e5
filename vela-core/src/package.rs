//! Package object graph
//!
//! A package is the parsed, validated declarative description the engine
//! reconciles against the platform. It is an ordered set of objects, each
//! carrying a kind, a package-local unique name ("pkg-name") and a parsed
//! body. Names and secret-bearing fields may be indirections (`envRef` /
//! `secretRef`) resolved at apply time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kind::Kind;
use crate::resources::{
    ParsedBucket, ParsedCheck, ParsedDashboard, ParsedEndpoint, ParsedLabel, ParsedRule,
    ParsedTask, ParsedTelegraf, ParsedVariable,
};

/// Wire api version every package document must carry.
pub const API_VERSION: &str = "vela.dev/v1alpha1";

/// Key payload of an envRef / secretRef wire object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefKey {
    pub key: String,
}

/// A possibly-indirect string value inside a package.
///
/// On the wire a reference is either a plain string, `{envRef: {key}}`, or
/// `{secretRef: {key}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    EnvRef {
        #[serde(rename = "envRef")]
        env: RefKey,
        #[serde(skip)]
        value: Option<String>,
    },
    SecretRef {
        #[serde(rename = "secretRef")]
        secret: RefKey,
    },
    Literal(String),
}

impl Default for Reference {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

impl Reference {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn env(key: impl Into<String>) -> Self {
        Self::EnvRef {
            env: RefKey { key: key.into() },
            value: None,
        }
    }

    pub fn secret(key: impl Into<String>) -> Self {
        Self::SecretRef {
            secret: RefKey { key: key.into() },
        }
    }

    /// Rendered value. Unresolved envRefs render as `$key` to signal the
    /// missing substitution; secretRefs render their key.
    pub fn render(&self) -> String {
        match self {
            Reference::Literal(v) => v.clone(),
            Reference::EnvRef { env, value } => match value {
                Some(v) => v.clone(),
                None => format!("${}", env.key),
            },
            Reference::SecretRef { secret } => secret.key.clone(),
        }
    }

    /// The env key when this reference is an envRef, resolved or not.
    pub fn env_key(&self) -> Option<&str> {
        match self {
            Reference::EnvRef { env, .. } => Some(&env.key),
            _ => None,
        }
    }

    pub fn secret_key(&self) -> Option<&str> {
        match self {
            Reference::SecretRef { secret } => Some(&secret.key),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Reference::EnvRef { value: None, .. })
    }

    /// Substitutes the env value when the key is present. Returns whether
    /// the reference is resolved afterwards.
    pub fn resolve_env(&mut self, envs: &HashMap<String, String>) -> bool {
        if let Reference::EnvRef { env, value } = self {
            if let Some(v) = envs.get(env.key.as_str()) {
                *value = Some(v.clone());
            }
            return value.is_some();
        }
        true
    }
}

/// Identity of a package object: the pkg-name plus an optional display name
/// override. On the wire this is the document's top-level `metadata`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub name: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Reference>,
}

impl Identity {
    pub fn named(pkg_name: impl Into<String>) -> Self {
        Self {
            name: Reference::literal(pkg_name),
            display_name: None,
        }
    }

    /// The unique-within-package lookup key.
    pub fn pkg_name(&self) -> String {
        self.name.render()
    }

    /// The name the resource carries on the platform.
    pub fn name(&self) -> String {
        match &self.display_name {
            Some(d) => d.render(),
            None => self.pkg_name(),
        }
    }
}

/// An association from a package object to another declared object, as a
/// `{kind, name}` entry under `spec.associations`. Only label associations
/// exist today; the name may be an envRef.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub kind: Kind,
    pub name: Reference,
}

impl Association {
    pub fn label(name: impl Into<String>) -> Self {
        Self {
            kind: Kind::Label,
            name: Reference::literal(name),
        }
    }

    pub fn is_label(&self) -> bool {
        self.kind.is(Kind::Label)
    }

    /// pkg-name of the associated object.
    pub fn pkg_name(&self) -> String {
        self.name.render()
    }
}

/// Kind-specific body of a package object. Check and endpoint subkind names
/// are accepted on the wire; the concrete subkind is carried by the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum ResourceSpec {
    Bucket(ParsedBucket),
    #[serde(alias = "CheckDeadman", alias = "CheckThreshold")]
    Check(ParsedCheck),
    Dashboard(ParsedDashboard),
    Label(ParsedLabel),
    #[serde(
        alias = "NotificationEndpointHTTP",
        alias = "NotificationEndpointPagerDuty",
        alias = "NotificationEndpointSlack"
    )]
    NotificationEndpoint(ParsedEndpoint),
    NotificationRule(ParsedRule),
    Task(ParsedTask),
    Telegraf(ParsedTelegraf),
    Variable(ParsedVariable),
}

impl ResourceSpec {
    fn identity(&self) -> &Identity {
        match self {
            ResourceSpec::Bucket(b) => &b.identity,
            ResourceSpec::Check(c) => &c.identity,
            ResourceSpec::Dashboard(d) => &d.identity,
            ResourceSpec::Label(l) => &l.identity,
            ResourceSpec::NotificationEndpoint(e) => &e.identity,
            ResourceSpec::NotificationRule(r) => &r.identity,
            ResourceSpec::Task(t) => &t.identity,
            ResourceSpec::Telegraf(t) => &t.identity,
            ResourceSpec::Variable(v) => &v.identity,
        }
    }

    fn identity_mut(&mut self) -> &mut Identity {
        match self {
            ResourceSpec::Bucket(b) => &mut b.identity,
            ResourceSpec::Check(c) => &mut c.identity,
            ResourceSpec::Dashboard(d) => &mut d.identity,
            ResourceSpec::Label(l) => &mut l.identity,
            ResourceSpec::NotificationEndpoint(e) => &mut e.identity,
            ResourceSpec::NotificationRule(r) => &mut r.identity,
            ResourceSpec::Task(t) => &mut t.identity,
            ResourceSpec::Telegraf(t) => &mut t.identity,
            ResourceSpec::Variable(v) => &mut v.identity,
        }
    }
}

/// One declared object inside a package.
///
/// Identity lives on the kind-specific body in memory but travels as the
/// document's top-level `metadata` on the wire; the wire struct below
/// carries the mapping in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ObjectWire", into = "ObjectWire")]
pub struct Object {
    pub api_version: String,
    pub spec: ResourceSpec,
}

/// Wire shape of a package document:
/// `{apiVersion, kind, metadata: {name}, spec}`.
#[derive(Serialize, Deserialize)]
struct ObjectWire {
    #[serde(rename = "apiVersion")]
    api_version: String,
    metadata: Identity,
    #[serde(flatten)]
    spec: ResourceSpec,
}

impl From<ObjectWire> for Object {
    fn from(wire: ObjectWire) -> Self {
        let mut spec = wire.spec;
        *spec.identity_mut() = wire.metadata;
        Self {
            api_version: wire.api_version,
            spec,
        }
    }
}

impl From<Object> for ObjectWire {
    fn from(object: Object) -> Self {
        let metadata = object.spec.identity().clone();
        Self {
            api_version: object.api_version,
            metadata,
            spec: object.spec,
        }
    }
}

impl Object {
    pub fn new(spec: ResourceSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            spec,
        }
    }

    pub fn kind(&self) -> Kind {
        match &self.spec {
            ResourceSpec::Bucket(_) => Kind::Bucket,
            ResourceSpec::Check(c) => c.kind(),
            ResourceSpec::Dashboard(_) => Kind::Dashboard,
            ResourceSpec::Label(_) => Kind::Label,
            ResourceSpec::NotificationEndpoint(e) => e.kind(),
            ResourceSpec::NotificationRule(_) => Kind::NotificationRule,
            ResourceSpec::Task(_) => Kind::Task,
            ResourceSpec::Telegraf(_) => Kind::Telegraf,
            ResourceSpec::Variable(_) => Kind::Variable,
        }
    }

    pub fn identity(&self) -> &Identity {
        self.spec.identity()
    }

    pub fn pkg_name(&self) -> String {
        self.identity().pkg_name()
    }

    fn references_mut(&mut self) -> Vec<&mut Reference> {
        let mut refs = Vec::new();
        match &mut self.spec {
            ResourceSpec::Bucket(b) => {
                collect_identity(&mut b.identity, &mut refs);
                refs.extend(b.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::Check(c) => {
                collect_identity(&mut c.identity, &mut refs);
                refs.extend(c.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::Dashboard(d) => {
                collect_identity(&mut d.identity, &mut refs);
                refs.extend(d.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::Label(l) => collect_identity(&mut l.identity, &mut refs),
            ResourceSpec::NotificationEndpoint(e) => {
                collect_identity(&mut e.identity, &mut refs);
                refs.extend(e.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::NotificationRule(r) => {
                collect_identity(&mut r.identity, &mut refs);
                refs.push(&mut r.endpoint_name);
                refs.extend(r.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::Task(t) => {
                collect_identity(&mut t.identity, &mut refs);
                refs.extend(t.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::Telegraf(t) => {
                collect_identity(&mut t.identity, &mut refs);
                refs.extend(t.associations.iter_mut().map(|a| &mut a.name));
            }
            ResourceSpec::Variable(v) => {
                collect_identity(&mut v.identity, &mut refs);
                refs.extend(v.associations.iter_mut().map(|a| &mut a.name));
            }
        }
        refs
    }

    fn references(&self) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = Vec::new();
        let identity = self.identity();
        refs.push(&identity.name);
        if let Some(d) = &identity.display_name {
            refs.push(d);
        }
        if let ResourceSpec::NotificationRule(r) = &self.spec {
            refs.push(&r.endpoint_name);
        }
        refs.extend(association_refs(&self.spec).iter().map(|a| &a.name));
        refs
    }
}

fn collect_identity<'a>(identity: &'a mut Identity, refs: &mut Vec<&'a mut Reference>) {
    refs.push(&mut identity.name);
    if let Some(d) = &mut identity.display_name {
        refs.push(d);
    }
}

/// Validation behavior for [`Package::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Full,
    /// Tolerates an otherwise-empty package; used by the exporter and by
    /// applies driven by a stack, where an empty package legitimately means
    /// "delete everything the stack owns".
    WithoutResources,
}

/// Structural problem with a package.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package contains no resources")]
    Empty,

    #[error("object {object:?} carries api version {found:?}, expected {expected:?}")]
    ApiVersion {
        object: String,
        found: String,
        expected: &'static str,
    },

    #[error("duplicate pkg-name {pkg_name:?} for kind {kind}")]
    DuplicateName { kind: Kind, pkg_name: String },

    #[error("object {object:?} associates unknown label {label:?}")]
    UnknownLabelAssociation { object: String, label: String },

    #[error("invalid package document: {0}")]
    Decode(String),
}

/// A parsed, ordered set of declared objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub objects: Vec<Object>,
}

impl Package {
    pub fn new(objects: Vec<Object>) -> Self {
        Self { objects }
    }

    pub fn buckets(&self) -> impl Iterator<Item = &ParsedBucket> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Bucket(b) => Some(b),
            _ => None,
        })
    }

    pub fn checks(&self) -> impl Iterator<Item = &ParsedCheck> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Check(c) => Some(c),
            _ => None,
        })
    }

    pub fn dashboards(&self) -> impl Iterator<Item = &ParsedDashboard> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Dashboard(d) => Some(d),
            _ => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &ParsedLabel> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Label(l) => Some(l),
            _ => None,
        })
    }

    pub fn notification_endpoints(&self) -> impl Iterator<Item = &ParsedEndpoint> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::NotificationEndpoint(e) => Some(e),
            _ => None,
        })
    }

    pub fn notification_rules(&self) -> impl Iterator<Item = &ParsedRule> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::NotificationRule(r) => Some(r),
            _ => None,
        })
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ParsedTask> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Task(t) => Some(t),
            _ => None,
        })
    }

    pub fn telegrafs(&self) -> impl Iterator<Item = &ParsedTelegraf> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Telegraf(t) => Some(t),
            _ => None,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &ParsedVariable> {
        self.objects.iter().filter_map(|o| match &o.spec {
            ResourceSpec::Variable(v) => Some(v),
            _ => None,
        })
    }

    /// Checks structural invariants: api versions, unique
    /// (kind-family, pkg-name) pairs, and label associations that point at
    /// labels declared in this package.
    pub fn validate(&self, mode: ValidationMode) -> Result<(), PackageError> {
        if self.objects.is_empty() && mode == ValidationMode::Full {
            return Err(PackageError::Empty);
        }

        for o in &self.objects {
            if o.api_version != API_VERSION {
                return Err(PackageError::ApiVersion {
                    object: o.pkg_name(),
                    found: o.api_version.clone(),
                    expected: API_VERSION,
                });
            }
        }

        let mut seen: BTreeSet<(Kind, String)> = BTreeSet::new();
        for o in &self.objects {
            let key = (o.kind().family(), o.pkg_name());
            if !seen.insert(key.clone()) {
                return Err(PackageError::DuplicateName {
                    kind: key.0,
                    pkg_name: key.1,
                });
            }
        }

        let label_names: BTreeSet<String> =
            self.labels().map(|l| l.identity.pkg_name()).collect();
        for o in &self.objects {
            for assoc in association_refs(&o.spec) {
                // Unresolved envRefs are reported through missing_env_refs,
                // not failed here.
                if assoc.is_label()
                    && assoc.name.is_resolved()
                    && !label_names.contains(&assoc.pkg_name())
                {
                    return Err(PackageError::UnknownLabelAssociation {
                        object: o.pkg_name(),
                        label: assoc.pkg_name(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Decodes a `---`-separated YAML (or JSON) stream of package documents.
    pub fn from_yaml(input: &str) -> Result<Self, PackageError> {
        use serde::Deserialize as _;

        let mut objects = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(input) {
            let value = serde_yaml::Value::deserialize(doc)
                .map_err(|e| PackageError::Decode(e.to_string()))?;
            if value.is_null() {
                continue;
            }
            let object: Object =
                serde_yaml::from_value(value).map_err(|e| PackageError::Decode(e.to_string()))?;
            objects.push(object);
        }
        Ok(Self::new(objects))
    }

    /// Renders the package as a `---`-separated YAML stream.
    pub fn to_yaml(&self) -> Result<String, PackageError> {
        let mut out = String::new();
        for o in &self.objects {
            let doc =
                serde_yaml::to_string(o).map_err(|e| PackageError::Decode(e.to_string()))?;
            out.push_str("---\n");
            out.push_str(&doc);
        }
        Ok(out)
    }

    /// Substitutes envRef values from the provided map. Unmet keys stay
    /// unresolved and are reported by [`Package::missing_env_refs`].
    pub fn apply_env_refs(&mut self, envs: &HashMap<String, String>) {
        for o in &mut self.objects {
            for r in o.references_mut() {
                r.resolve_env(envs);
            }
        }
    }

    /// Env keys still unresolved after [`Package::apply_env_refs`], sorted
    /// and deduplicated.
    pub fn missing_env_refs(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = BTreeSet::new();
        for o in &self.objects {
            for r in o.references() {
                if !r.is_resolved() {
                    if let Some(k) = r.env_key() {
                        keys.insert(k.to_string());
                    }
                }
            }
        }
        keys.into_iter().collect()
    }

    /// Secret keys referenced anywhere in the package, mapped to `false`
    /// until dry-run or a caller-provided secret satisfies them.
    pub fn secret_refs(&self) -> BTreeMap<String, bool> {
        let mut keys = BTreeMap::new();
        for e in self.notification_endpoints() {
            for r in e.spec.secret_refs() {
                if let Some(k) = r.secret_key() {
                    keys.insert(k.to_string(), false);
                }
            }
        }
        keys
    }
}

fn association_refs(spec: &ResourceSpec) -> &[Association] {
    match spec {
        ResourceSpec::Bucket(b) => &b.associations,
        ResourceSpec::Check(c) => &c.associations,
        ResourceSpec::Dashboard(d) => &d.associations,
        ResourceSpec::Label(_) => &[],
        ResourceSpec::NotificationEndpoint(e) => &e.associations,
        ResourceSpec::NotificationRule(r) => &r.associations,
        ResourceSpec::Task(t) => &t.associations,
        ResourceSpec::Telegraf(t) => &t.associations,
        ResourceSpec::Variable(v) => &v.associations,
    }
}
