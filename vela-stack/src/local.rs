//! Local file stack store
//!
//! Stores every stack in a single JSON file (default: vela.stacks.json).
//! Writes go through a temp file renamed into place, so a crashed write
//! never leaves a torn index behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use vela_core::{PlatformId, ServiceError, ServiceResult, Stack, StackStore};

#[derive(Debug, Serialize, Deserialize)]
struct StackIndex {
    version: u32,
    stacks: Vec<Stack>,
}

impl StackIndex {
    const CURRENT_VERSION: u32 = 1;

    fn empty() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            stacks: Vec::new(),
        }
    }
}

/// Stack store backed by a local JSON file.
#[derive(Debug, Clone)]
pub struct LocalStackStore {
    path: PathBuf,
}

impl LocalStackStore {
    /// Default index file name.
    pub const DEFAULT_STACK_FILE: &'static str = "vela.stacks.json";

    /// Store writing to `vela.stacks.json` in the current directory.
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STACK_FILE))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_index(&self) -> ServiceResult<StackIndex> {
        match fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| ServiceError::internal(format!("invalid stack index: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StackIndex::empty()),
            Err(e) => Err(ServiceError::internal(e)),
        }
    }

    async fn write_index(&self, index: &StackIndex) -> ServiceResult<()> {
        let raw = serde_json::to_vec_pretty(index).map_err(ServiceError::internal)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).await.map_err(ServiceError::internal)?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(ServiceError::internal)
    }
}

impl Default for LocalStackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StackStore for LocalStackStore {
    async fn create_stack(&self, stack: Stack) -> ServiceResult<()> {
        let mut index = self.read_index().await?;
        if index.stacks.iter().any(|s| s.id == stack.id) {
            return Err(ServiceError::Conflict(format!(
                "stack {} already exists",
                stack.id
            )));
        }
        index.stacks.push(stack);
        self.write_index(&index).await
    }

    async fn read_stack(&self, id: PlatformId) -> ServiceResult<Stack> {
        let index = self.read_index().await?;
        index
            .stacks
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("stack {id}")))
    }

    async fn update_stack(&self, stack: Stack) -> ServiceResult<()> {
        let mut index = self.read_index().await?;
        let Some(slot) = index.stacks.iter_mut().find(|s| s.id == stack.id) else {
            return Err(ServiceError::not_found(format!("stack {}", stack.id)));
        };
        *slot = stack;
        self.write_index(&index).await
    }

    async fn delete_stack(&self, id: PlatformId) -> ServiceResult<()> {
        let mut index = self.read_index().await?;
        let before = index.stacks.len();
        index.stacks.retain(|s| s.id != id);
        if index.stacks.len() == before {
            return Err(ServiceError::not_found(format!("stack {id}")));
        }
        self.write_index(&index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_store() -> LocalStackStore {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "vela-stack-test-{}-{}.json",
            std::process::id(),
            n
        ));
        let _ = std::fs::remove_file(&path);
        LocalStackStore::with_path(path)
    }

    fn stack(id: u64) -> Stack {
        let mut s = Stack::new(PlatformId(1), "test-stack");
        s.id = PlatformId(id);
        s
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let store = scratch_store();
        assert!(store.read_stack(PlatformId(1)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn create_read_update_delete_round_trips() {
        let store = scratch_store();

        store.create_stack(stack(5)).await.unwrap();
        let read = store.read_stack(PlatformId(5)).await.unwrap();
        assert_eq!(read.name, "test-stack");

        let mut updated = read.clone();
        updated.description = "updated".into();
        store.update_stack(updated).await.unwrap();
        assert_eq!(
            store.read_stack(PlatformId(5)).await.unwrap().description,
            "updated"
        );

        store.delete_stack(PlatformId(5)).await.unwrap();
        assert!(store.read_stack(PlatformId(5)).await.unwrap_err().is_not_found());

        let _ = std::fs::remove_file(store.path());
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = scratch_store();
        store.create_stack(stack(2)).await.unwrap();
        let err = store.create_stack(stack(2)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let _ = std::fs::remove_file(store.path());
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let store = scratch_store();
        store.create_stack(stack(8)).await.unwrap();

        let reopened = LocalStackStore::with_path(store.path().to_path_buf());
        assert!(reopened.read_stack(PlatformId(8)).await.is_ok());
        let _ = std::fs::remove_file(store.path());
    }
}
