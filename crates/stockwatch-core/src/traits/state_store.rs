// # Known State Store Trait
//
// Defines the interface for persisting the exhibition → known vehicle ids
// mapping.
//
// ## Purpose
//
// The known state is the diff baseline. It prevents double notification
// across cycles and across restarts.
//
// ## Implementations
//
// - File-based: whole-file JSON with atomic replace and backup recovery
// - In-memory: tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use stockwatch_core::KnownStateStore;
//
// let mut state = store.load().await?;
// state.record("E01", &current_ids);
// store.save(&state).await?;
// ```

use async_trait::async_trait;

use crate::model::KnownState;

/// Trait for known-state store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Recover from corrupted files
///
/// ## Forbidden Capabilities
/// - ❌ Decide what is known (owned by `PollScheduler`)
/// - ❌ Spawn background tasks
///
/// ## Implementation Guidelines
///
/// - **Whole-state writes**: `save()` replaces the persisted state entirely
/// - **Async I/O only**: never block the runtime
/// - **No locking required**: the scheduler is the only writer
#[async_trait]
pub trait KnownStateStore: Send + Sync {
    /// Load the persisted state
    ///
    /// # Returns
    ///
    /// - `Ok(KnownState)`: The state (empty if nothing was persisted)
    /// - `Err(Error)`: Storage error
    async fn load(&self) -> Result<KnownState, crate::Error>;

    /// Persist the whole state
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully written
    /// - `Err(Error)`: Storage error (caller keeps its in-memory state)
    async fn save(&self, state: &KnownState) -> Result<(), crate::Error>;
}
