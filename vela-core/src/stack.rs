//! Stack records and their store contract
//!
//! A stack is the persisted record of what a prior apply created and still
//! owns: the mapping from pkg-names to platform ids, plus the associations
//! each resource carried. The stack is rewritten only after side effects of
//! an apply; a no-change apply leaves it untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceResult;
use crate::ids::PlatformId;
use crate::kind::Kind;

/// Persisted record linking a previous apply's pkg-names to platform ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Locations of package sources included when the stack is applied.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub resources: Vec<StackResource>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stack {
    /// A stack shell awaiting id and timestamps from `init_stack`.
    pub fn new(org_id: PlatformId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PlatformId::ZERO,
            org_id,
            name: name.into(),
            description: String::new(),
            urls: Vec::new(),
            resources: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_resource(&self, kind: Kind, pkg_name: &str) -> Option<&StackResource> {
        self.resources
            .iter()
            .find(|r| r.kind.is(kind) && r.pkg_name == pkg_name)
    }
}

/// One resource side effect recorded from applying a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackResource {
    pub api_version: String,
    #[serde(rename = "resourceID")]
    pub id: PlatformId,
    pub kind: Kind,
    pub pkg_name: String,
    #[serde(default)]
    pub associations: Vec<StackResourceAssociation>,
}

/// Associates a stack resource with another stack resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackResourceAssociation {
    pub kind: Kind,
    pub pkg_name: String,
}

/// Storage behavior the engine depends on for stacks.
#[async_trait]
pub trait StackStore: Send + Sync {
    async fn create_stack(&self, stack: Stack) -> ServiceResult<()>;
    async fn read_stack(&self, id: PlatformId) -> ServiceResult<Stack>;
    async fn update_stack(&self, stack: Stack) -> ServiceResult<()>;
    async fn delete_stack(&self, id: PlatformId) -> ServiceResult<()>;
}
