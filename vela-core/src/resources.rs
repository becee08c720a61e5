//! Parsed resource bodies
//!
//! The kind-specific bodies a package object carries after parsing. These
//! are the declared ("desired") forms; the platform-side forms live in
//! [`crate::platform`]. Value types shared between the two (statuses, check
//! thresholds, rule matchers, variable arguments) are defined here.

use serde::{Deserialize, Serialize};

use crate::package::{Association, Identity, Reference};

/// Activation status carried by checks, rules, tasks and endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

/// Severity level used by check thresholds and rule status matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckLevel {
    Ok,
    Info,
    Warn,
    Crit,
}

/// A single threshold of a threshold check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Threshold {
    Greater { level: CheckLevel, value: f64 },
    Lesser { level: CheckLevel, value: f64 },
    InsideRange { level: CheckLevel, min: f64, max: f64 },
    OutsideRange { level: CheckLevel, min: f64, max: f64 },
}

/// Variant payload of a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    Deadman {
        level: CheckLevel,
        /// Seconds a series may be silent before the check fires.
        time_since_seconds: u64,
        /// Seconds after which a dead series stops reporting.
        stale_seconds: u64,
        report_zero: bool,
    },
    Threshold {
        thresholds: Vec<Threshold>,
    },
}

/// Status transition matcher on a notification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRule {
    pub current_level: CheckLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_level: Option<CheckLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOperator {
    Equal,
    NotEqual,
}

/// Tag matcher on a notification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub key: String,
    pub value: String,
    pub operator: TagOperator,
}

/// Arguments of a dashboard variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableArgs {
    Query { query: String, language: String },
    Constant { values: Vec<String> },
    Map { values: Vec<(String, String)> },
}

/// One chart cell on a dashboard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chart {
    pub name: String,
    pub chart_kind: String,
    pub x_position: i32,
    pub y_position: i32,
    pub height: i32,
    pub width: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedBucket {
    #[serde(skip)]
    pub identity: Identity,
    #[serde(default)]
    pub description: String,
    /// Retention period in seconds; `None` keeps data forever.
    #[serde(default)]
    pub retention_seconds: Option<u64>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLabel {
    #[serde(skip)]
    pub identity: Identity,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDashboard {
    #[serde(skip)]
    pub identity: Identity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub charts: Vec<Chart>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCheck {
    #[serde(skip)]
    pub identity: Identity,
    pub spec: CheckSpec,
    #[serde(default)]
    pub description: String,
    pub query: String,
    pub every_seconds: u64,
    #[serde(default)]
    pub offset_seconds: u64,
    #[serde(default)]
    pub status_message_template: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl ParsedCheck {
    pub fn kind(&self) -> crate::Kind {
        match self.spec {
            CheckSpec::Deadman { .. } => crate::Kind::CheckDeadman,
            CheckSpec::Threshold { .. } => crate::Kind::CheckThreshold,
        }
    }
}

/// Authentication material on an HTTP endpoint. Secret-bearing fields hold
/// references so values never live in the package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAuth {
    None,
    Basic { username: Reference, password: Reference },
    Bearer { token: Reference },
}

/// Variant payload of a notification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointSpec {
    Http {
        method: String,
        url: String,
        auth: HttpAuth,
    },
    PagerDuty {
        client_url: String,
        routing_key: Reference,
    },
    Slack {
        url: String,
        token: Reference,
    },
}

impl EndpointSpec {
    /// The secret references this endpoint declares, in field order.
    pub fn secret_refs(&self) -> Vec<&Reference> {
        match self {
            EndpointSpec::Http { auth, .. } => match auth {
                HttpAuth::None => Vec::new(),
                HttpAuth::Basic { username, password } => vec![username, password],
                HttpAuth::Bearer { token } => vec![token],
            },
            EndpointSpec::PagerDuty { routing_key, .. } => vec![routing_key],
            EndpointSpec::Slack { token, .. } => vec![token],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEndpoint {
    #[serde(skip)]
    pub identity: Identity,
    pub spec: EndpointSpec,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl ParsedEndpoint {
    pub fn kind(&self) -> crate::Kind {
        match self.spec {
            EndpointSpec::Http { .. } => crate::Kind::NotificationEndpointHttp,
            EndpointSpec::PagerDuty { .. } => crate::Kind::NotificationEndpointPagerDuty,
            EndpointSpec::Slack { .. } => crate::Kind::NotificationEndpointSlack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRule {
    #[serde(skip)]
    pub identity: Identity,
    /// pkg-name of the endpoint this rule fires through. May be an envRef.
    pub endpoint_name: Reference,
    #[serde(default)]
    pub description: String,
    pub every_seconds: u64,
    #[serde(default)]
    pub offset_seconds: u64,
    #[serde(default)]
    pub message_template: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub status_rules: Vec<StatusRule>,
    #[serde(default)]
    pub tag_rules: Vec<TagRule>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTask {
    #[serde(skip)]
    pub identity: Identity,
    #[serde(default)]
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub every_seconds: Option<u64>,
    #[serde(default)]
    pub offset_seconds: u64,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub associations: Vec<Association>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTelegraf {
    #[serde(skip)]
    pub identity: Identity,
    #[serde(default)]
    pub description: String,
    /// Raw agent configuration, passed through untouched.
    pub config: String,
    #[serde(default)]
    pub associations: Vec<Association>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedVariable {
    #[serde(skip)]
    pub identity: Identity,
    #[serde(default)]
    pub description: String,
    pub args: VariableArgs,
    #[serde(default)]
    pub associations: Vec<Association>,
}

macro_rules! placeholder_ctor {
    ($ty:ty { $($field:ident : $value:expr),* $(,)? }) => {
        impl $ty {
            /// Synthetic body carrying only the identity needed to schedule a
            /// removal recorded in a prior stack.
            pub(crate) fn placeholder(pkg_name: &str) -> Self {
                Self {
                    identity: Identity::named(pkg_name),
                    $($field: $value),*
                }
            }
        }
    };
}

placeholder_ctor!(ParsedBucket {
    description: String::new(),
    retention_seconds: None,
    associations: Vec::new(),
});
placeholder_ctor!(ParsedLabel {
    color: String::new(),
    description: String::new(),
});
placeholder_ctor!(ParsedDashboard {
    description: String::new(),
    charts: Vec::new(),
    associations: Vec::new(),
});
placeholder_ctor!(ParsedCheck {
    spec: CheckSpec::Threshold { thresholds: Vec::new() },
    description: String::new(),
    query: String::new(),
    every_seconds: 0,
    offset_seconds: 0,
    status_message_template: String::new(),
    status: Status::Active,
    associations: Vec::new(),
});
placeholder_ctor!(ParsedEndpoint {
    spec: EndpointSpec::Http {
        method: String::new(),
        url: String::new(),
        auth: HttpAuth::None,
    },
    description: String::new(),
    status: Status::Active,
    associations: Vec::new(),
});
placeholder_ctor!(ParsedRule {
    endpoint_name: Reference::literal(""),
    description: String::new(),
    every_seconds: 0,
    offset_seconds: 0,
    message_template: String::new(),
    status: Status::Active,
    status_rules: Vec::new(),
    tag_rules: Vec::new(),
    associations: Vec::new(),
});
placeholder_ctor!(ParsedTask {
    description: String::new(),
    query: String::new(),
    every_seconds: None,
    offset_seconds: 0,
    cron: None,
    status: Status::Active,
    associations: Vec::new(),
});
placeholder_ctor!(ParsedTelegraf {
    description: String::new(),
    config: String::new(),
    associations: Vec::new(),
});
placeholder_ctor!(ParsedVariable {
    description: String::new(),
    args: VariableArgs::Constant { values: Vec::new() },
    associations: Vec::new(),
});
