// # Status Reporting
//
// The scheduler records per-target outcomes on a shared `StatusBoard`; an
// independent task renders the board periodically and sends it to the
// status channel.
//
// ## Consistency
//
// The board is a staleness-tolerant snapshot. The reporter never touches
// the known-state baseline; known counts are copied onto the board by the
// scheduler after each successful cycle.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::TargetConfig;
use crate::traits::{ChannelTransport, OutboundMessage};

/// Number of recent discovery events kept on the board
pub const RECENT_EVENT_LIMIT: usize = 10;

/// Transcript messages are cut at this many characters
pub const TRANSCRIPT_LIMIT: usize = 1900;

/// Last observed state of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    /// Exhibition id
    pub exhb_no: String,
    /// Display label
    pub label: String,
    /// Known-id count after the last successful cycle
    pub known_count: usize,
    /// Last status line, `None` before the first cycle
    pub last_status: Option<String>,
    /// Combined transcript of the last cycle
    pub last_transcript: Option<String>,
}

/// One discovery event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Detection time
    pub at: DateTime<Local>,
    /// Target label
    pub label: String,
    /// Number of new vehicles
    pub new_count: usize,
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] 신규 {}대",
            self.at.format("%H:%M:%S"),
            self.label,
            self.new_count
        )
    }
}

/// Point-in-time copy of the board
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Completed poll cycles
    pub poll_count: u64,
    /// Targets in configuration order
    pub targets: Vec<TargetStatus>,
    /// Most recent events, oldest first
    pub recent_events: Vec<StatusEvent>,
}

#[derive(Debug, Default)]
struct BoardInner {
    poll_count: u64,
    targets: Vec<TargetStatus>,
    recent_events: VecDeque<StatusEvent>,
}

/// Shared in-memory cycle results
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: RwLock<BoardInner>,
}

impl StatusBoard {
    /// Create a board listing the given targets
    pub fn new(targets: &[TargetConfig]) -> Self {
        let targets = targets
            .iter()
            .map(|t| TargetStatus {
                exhb_no: t.exhb_no.clone(),
                label: t.label.clone(),
                known_count: 0,
                last_status: None,
                last_transcript: None,
            })
            .collect();

        Self {
            inner: RwLock::new(BoardInner {
                targets,
                ..Default::default()
            }),
        }
    }

    /// Count one started cycle
    pub async fn record_poll(&self) {
        self.inner.write().await.poll_count += 1;
    }

    /// Record the outcome of one target
    ///
    /// `known_count` is `None` when the cycle failed and the count is unchanged.
    pub async fn record_target(
        &self,
        exhb_no: &str,
        status: String,
        transcript: String,
        known_count: Option<usize>,
    ) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.targets.iter_mut().find(|t| t.exhb_no == exhb_no) {
            entry.last_status = Some(status);
            entry.last_transcript = Some(transcript);
            if let Some(count) = known_count {
                entry.known_count = count;
            }
        }
    }

    /// Seed known counts from a loaded baseline
    pub async fn set_known_count(&self, exhb_no: &str, count: usize) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.targets.iter_mut().find(|t| t.exhb_no == exhb_no) {
            entry.known_count = count;
        }
    }

    /// Append a discovery event, keeping only the most recent ones
    pub async fn record_event(&self, label: &str, new_count: usize) {
        let mut inner = self.inner.write().await;
        inner.recent_events.push_back(StatusEvent {
            at: Local::now(),
            label: label.to_string(),
            new_count,
        });
        while inner.recent_events.len() > RECENT_EVENT_LIMIT {
            inner.recent_events.pop_front();
        }
    }

    /// Copy the current board
    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;
        StatusSnapshot {
            poll_count: inner.poll_count,
            targets: inner.targets.clone(),
            recent_events: inner.recent_events.iter().cloned().collect(),
        }
    }
}

/// Render the summary message
pub fn render_summary(snapshot: &StatusSnapshot, now: DateTime<Local>) -> String {
    let mut lines = vec![format!("**[상태 보고]** {}", now.format("%Y-%m-%d %H:%M:%S"))];

    for target in &snapshot.targets {
        lines.push(format!(
            "**{}** {}대 | {}",
            target.label,
            target.known_count,
            target.last_status.as_deref().unwrap_or("-")
        ));
    }
    lines.push(format!("폴링 횟수: {}회", snapshot.poll_count));

    if !snapshot.recent_events.is_empty() {
        lines.push("\n**최근 이벤트**".to_string());
        lines.extend(snapshot.recent_events.iter().map(ToString::to_string));
    }

    lines.join("\n")
}

/// Render one target's transcript as a code block
pub fn render_transcript(label: &str, transcript: &str) -> String {
    let body = if transcript.chars().count() < TRANSCRIPT_LIMIT {
        transcript.to_string()
    } else {
        let cut: String = transcript.chars().take(TRANSCRIPT_LIMIT).collect();
        format!("{}\n...(중략)", cut)
    };
    format!("**[{} 로그]**\n```json\n{}\n```", label, body)
}

/// Periodic status summary sender
pub struct StatusReporter {
    board: Arc<StatusBoard>,
    transport: Arc<dyn ChannelTransport>,
    channel_id: u64,
    interval: Duration,
}

impl StatusReporter {
    /// Create a reporter for the status channel
    pub fn new(
        board: Arc<StatusBoard>,
        transport: Arc<dyn ChannelTransport>,
        channel_id: u64,
        interval: Duration,
    ) -> Self {
        Self {
            board,
            transport,
            channel_id,
            interval,
        }
    }

    /// Send one summary followed by the per-target transcripts
    ///
    /// Returns the number of messages delivered. Failures are logged.
    pub async fn report_once(&self) -> usize {
        let snapshot = self.board.snapshot().await;
        let mut delivered = 0;

        let summary = OutboundMessage::text(render_summary(&snapshot, Local::now()));
        match self.transport.send(self.channel_id, &summary).await {
            Ok(()) => delivered += 1,
            Err(e) => error!("Status summary delivery failed: {}", e),
        }

        for target in &snapshot.targets {
            let Some(transcript) = &target.last_transcript else {
                continue;
            };
            let message = OutboundMessage::text(render_transcript(&target.label, transcript));
            match self.transport.send(self.channel_id, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("[{}] transcript delivery failed: {}", target.label, e),
            }
        }

        debug!("Status report sent: {} message(s)", delivered);
        delivered
    }

    /// Report on every interval until the shutdown signal fires
    pub async fn run(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report_once().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("Status reporter stopped");
                    break;
                }
            }
        }
    }
}
