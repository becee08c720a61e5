//! Resource kinds
//!
//! The closed set of resource kinds a package may declare. Check and
//! notification-endpoint subkinds share a namespace with their family kind:
//! a package cannot hold both a `CheckDeadman` and a `CheckThreshold` under
//! the same pkg-name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a declared package object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Bucket,
    Check,
    CheckDeadman,
    CheckThreshold,
    Dashboard,
    Label,
    NotificationEndpoint,
    #[serde(rename = "NotificationEndpointHTTP")]
    NotificationEndpointHttp,
    NotificationEndpointPagerDuty,
    NotificationEndpointSlack,
    NotificationRule,
    Task,
    Telegraf,
    Variable,
}

impl Kind {
    /// Folds subkinds into the kind that owns their namespace.
    pub fn family(&self) -> Kind {
        match self {
            Kind::Check | Kind::CheckDeadman | Kind::CheckThreshold => Kind::Check,
            Kind::NotificationEndpoint
            | Kind::NotificationEndpointHttp
            | Kind::NotificationEndpointPagerDuty
            | Kind::NotificationEndpointSlack => Kind::NotificationEndpoint,
            k => *k,
        }
    }

    /// Whether two kinds address the same namespace.
    pub fn is(&self, other: Kind) -> bool {
        self.family() == other.family()
    }

    /// The resource type used for label mappings of this kind.
    pub fn resource_type(&self) -> ResourceType {
        match self.family() {
            Kind::Bucket => ResourceType::Buckets,
            Kind::Check => ResourceType::Checks,
            Kind::Dashboard => ResourceType::Dashboards,
            Kind::Label => ResourceType::Labels,
            Kind::NotificationEndpoint => ResourceType::NotificationEndpoints,
            Kind::NotificationRule => ResourceType::NotificationRules,
            Kind::Task => ResourceType::Tasks,
            Kind::Telegraf => ResourceType::Telegrafs,
            _ => ResourceType::Variables,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Bucket => "Bucket",
            Kind::Check => "Check",
            Kind::CheckDeadman => "CheckDeadman",
            Kind::CheckThreshold => "CheckThreshold",
            Kind::Dashboard => "Dashboard",
            Kind::Label => "Label",
            Kind::NotificationEndpoint => "NotificationEndpoint",
            Kind::NotificationEndpointHttp => "NotificationEndpointHTTP",
            Kind::NotificationEndpointPagerDuty => "NotificationEndpointPagerDuty",
            Kind::NotificationEndpointSlack => "NotificationEndpointSlack",
            Kind::NotificationRule => "NotificationRule",
            Kind::Task => "Task",
            Kind::Telegraf => "Telegraf",
            Kind::Variable => "Variable",
        };
        f.write_str(name)
    }
}

/// Resource type as the label-mapping service addresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Buckets,
    Checks,
    Dashboards,
    Labels,
    NotificationEndpoints,
    NotificationRules,
    Tasks,
    Telegrafs,
    Variables,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Buckets => "buckets",
            ResourceType::Checks => "checks",
            ResourceType::Dashboards => "dashboards",
            ResourceType::Labels => "labels",
            ResourceType::NotificationEndpoints => "notification_endpoints",
            ResourceType::NotificationRules => "notification_rules",
            ResourceType::Tasks => "tasks",
            ResourceType::Telegrafs => "telegrafs",
            ResourceType::Variables => "variables",
        };
        f.write_str(name)
    }
}
