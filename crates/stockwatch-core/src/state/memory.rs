// # Memory State Store
//
// In-memory implementation of KnownStateStore.
//
// ## Crash Behavior
//
// - All state is lost on restart
// - First cycle after restart is a cold start for every target
//   (no notifications, baseline re-registered)

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::model::KnownState;
use crate::traits::state_store::KnownStateStore;

/// In-memory known-state store
///
/// Clones share the same underlying state, so a test can keep a handle
/// while the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<KnownState>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with state
    pub fn with_state(state: KnownState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current persisted snapshot
    pub async fn snapshot(&self) -> KnownState {
        self.inner.read().await.clone()
    }

    /// Number of successful `save()` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnownStateStore for MemoryStateStore {
    async fn load(&self) -> Result<KnownState, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, state: &KnownState) -> Result<(), Error> {
        *self.inner.write().await = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
