//! Operational reporting to notification channels
//!
//! - [`StatusReporter`]: periodic summary of the [`StatusBoard`]
//! - [`UpdateLogReporter`]: one-shot deployment update report at startup

pub mod status;
pub mod update_log;

pub use status::{StatusBoard, StatusReporter, StatusSnapshot};
pub use update_log::{UpdateLogOutcome, UpdateLogReporter};
