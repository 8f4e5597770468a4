// # stockwatch-core
//
// Core library for the promotional-inventory watcher.
//
// ## Architecture Overview
//
// This library provides the core functionality for new-inventory alerts:
// - **ExhibitionSource**: Trait for fetching one exhibition's inventory
// - **TokenProvider**: Trait for acquiring per-request evasion tokens
// - **ChannelTransport**: Trait for delivering messages to channels
// - **KnownStateStore**: Trait for persisting the known-vehicle baseline
// - **CodeMerger**: Per-vehicle-code fetch, merge and dedup
// - **DiffEngine**: New-vehicle detection against the baseline
// - **NotificationDispatcher**: Message formatting and two-channel fan-out
// - **PollScheduler**: Core loop that orchestrates a polling cycle
// - **StatusReporter / UpdateLogReporter**: Operational reports
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from HTTP and chat implementations
// 2. **Failures are values**: A fetch failure never crashes the loop
// 3. **Append-only baseline**: A vehicle is announced at most once per target
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod merge;
pub mod model;
pub mod notify;
pub mod report;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ApiConfig, PayloadOverrides, TargetConfig, WatchConfig};
pub use diff::{DiffEngine, DiffOutcome};
pub use engine::{PollCycleResult, PollScheduler, WatchEvent};
pub use error::{Error, FetchError, Result};
pub use merge::{CodeMerger, MergeResult};
pub use model::{KnownState, VehicleRecord};
pub use notify::NotificationDispatcher;
pub use report::{StatusBoard, StatusReporter, UpdateLogReporter};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{ChannelTransport, ExhibitionSource, KnownStateStore, TokenProvider};
