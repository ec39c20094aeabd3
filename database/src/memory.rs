use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use subwatch_core::{CoreError, DatabaseError, PostStateStore, TrackedPost};
use tokio::sync::RwLock;

/// Process-local post state store with the same upsert semantics as the
/// SQLite store. Reads and writes can be switched to fail for exercising
/// the degraded paths.
#[derive(Debug, Default)]
pub struct MemoryPostStore {
    posts: RwLock<HashMap<String, TrackedPost>>,
    reads_failing: AtomicBool,
    writes_failing: AtomicBool,
    upserts: AtomicUsize,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reads_failing(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful upserts since creation.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }

    pub async fn snapshot(&self, post_id: &str) -> Option<TrackedPost> {
        self.posts.read().await.get(post_id).cloned()
    }
}

#[async_trait]
impl PostStateStore for MemoryPostStore {
    async fn get(&self, post_id: &str) -> Result<Option<TrackedPost>, CoreError> {
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable {
                reason: "reads disabled".to_string(),
            }
            .into());
        }
        Ok(self.posts.read().await.get(post_id).cloned())
    }

    async fn upsert(&self, state: &TrackedPost) -> Result<(), CoreError> {
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable {
                reason: "writes disabled".to_string(),
            }
            .into());
        }

        let mut posts = self.posts.write().await;
        let next = match posts.get(&state.post_id) {
            Some(stored) => state.clone().merged_over(stored),
            None => state.clone(),
        };
        posts.insert(next.post_id.clone(), next);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
