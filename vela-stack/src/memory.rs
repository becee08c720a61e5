//! In-memory stack store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vela_core::{PlatformId, ServiceError, ServiceResult, Stack, StackStore};

/// Stack store backed by a process-local map. Useful for tests and
/// embedded setups that do not need persistence.
#[derive(Debug, Default)]
pub struct MemoryStackStore {
    stacks: Mutex<HashMap<PlatformId, Stack>>,
}

impl MemoryStackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StackStore for MemoryStackStore {
    async fn create_stack(&self, stack: Stack) -> ServiceResult<()> {
        let mut stacks = self.stacks.lock().await;
        if stacks.contains_key(&stack.id) {
            return Err(ServiceError::Conflict(format!(
                "stack {} already exists",
                stack.id
            )));
        }
        stacks.insert(stack.id, stack);
        Ok(())
    }

    async fn read_stack(&self, id: PlatformId) -> ServiceResult<Stack> {
        self.stacks
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("stack {id}")))
    }

    async fn update_stack(&self, stack: Stack) -> ServiceResult<()> {
        let mut stacks = self.stacks.lock().await;
        if !stacks.contains_key(&stack.id) {
            return Err(ServiceError::not_found(format!("stack {}", stack.id)));
        }
        stacks.insert(stack.id, stack);
        Ok(())
    }

    async fn delete_stack(&self, id: PlatformId) -> ServiceResult<()> {
        self.stacks
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found(format!("stack {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(id: u64) -> Stack {
        let mut s = Stack::new(PlatformId(1), "test-stack");
        s.id = PlatformId(id);
        s
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let store = MemoryStackStore::new();
        store.create_stack(stack(7)).await.unwrap();

        let read = store.read_stack(PlatformId(7)).await.unwrap();
        assert_eq!(read.name, "test-stack");
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = MemoryStackStore::new();
        store.create_stack(stack(7)).await.unwrap();
        let err = store.create_stack(stack(7)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_requires_existing_stack() {
        let store = MemoryStackStore::new();
        let err = store.update_stack(stack(9)).await.unwrap_err();
        assert!(err.is_not_found());

        store.create_stack(stack(9)).await.unwrap();
        let mut updated = stack(9);
        updated.description = "updated".into();
        store.update_stack(updated).await.unwrap();
        assert_eq!(
            store.read_stack(PlatformId(9)).await.unwrap().description,
            "updated"
        );
    }

    #[tokio::test]
    async fn delete_removes_stack() {
        let store = MemoryStackStore::new();
        store.create_stack(stack(3)).await.unwrap();
        store.delete_stack(PlatformId(3)).await.unwrap();
        assert!(store.read_stack(PlatformId(3)).await.unwrap_err().is_not_found());
    }
}
