// # Update Log Reporting
//
// One-shot startup report of a deployment update log (the output of the
// auto-update job). Once delivered, the file is overwritten with a marker so
// the same update is never reported twice.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::traits::{ChannelTransport, OutboundMessage};

/// Text the update job writes when nothing changed
pub const UP_TO_DATE_MARKER: &str = "Already up to date.";

/// Written back after a successful report
pub const REPORTED_MARKER: &str = "Already up to date. (Reported)";

/// Only the tail of a long log is sent
pub const LOG_TAIL_LIMIT: usize = 1800;

/// What the reporter did with the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateLogOutcome {
    /// File missing, empty, or already reported
    Nothing,
    /// Log sent and file marked as reported
    Reported,
}

/// Reports a pending update log to a channel
pub struct UpdateLogReporter {
    path: PathBuf,
    transport: Arc<dyn ChannelTransport>,
    channel_id: u64,
}

impl UpdateLogReporter {
    /// Create a reporter for a log file
    pub fn new(path: impl AsRef<Path>, transport: Arc<dyn ChannelTransport>, channel_id: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            transport,
            channel_id,
        }
    }

    /// Report the log if it holds an unreported update
    ///
    /// The file is only marked after successful delivery, so a failed send
    /// is retried on the next start.
    pub async fn report(&self) -> Result<UpdateLogOutcome, Error> {
        if !self.path.exists() {
            info!("Update log not found: {}", self.path.display());
            return Ok(UpdateLogOutcome::Nothing);
        }

        let content = fs::read_to_string(&self.path).await?;
        let content = content.trim();
        if content.is_empty() || content.contains(UP_TO_DATE_MARKER) {
            debug!("No pending update in {}", self.path.display());
            return Ok(UpdateLogOutcome::Nothing);
        }

        info!("Pending update log found ({} chars), reporting", content.chars().count());

        let message = OutboundMessage::text(render_update_message(
            content,
            &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ));
        self.transport.send(self.channel_id, &message).await?;

        if let Err(e) = fs::write(&self.path, REPORTED_MARKER).await {
            error!("Failed to mark update log as reported: {}", e);
            return Err(e.into());
        }

        info!("Update log reported");
        Ok(UpdateLogOutcome::Reported)
    }
}

/// Render the update announcement for a (trimmed) log body
pub fn render_update_message(content: &str, now: &str) -> String {
    let total = content.chars().count();
    let body = if total > LOG_TAIL_LIMIT {
        let tail: String = content.chars().skip(total - LOG_TAIL_LIMIT).collect();
        format!("{}\n...(중략)", tail)
    } else {
        content.to_string()
    };

    format!(
        "### 🚀 **자동 업데이트 감지** ({})\n```diff\n{}\n```\n✨ 시스템이 최신 버전으로 갱신되었습니다.",
        now, body
    )
}
