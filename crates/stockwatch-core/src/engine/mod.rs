//! Polling scheduler
//!
//! The PollScheduler is responsible for:
//! - Fetching every target through the per-code merger
//! - Diffing merged inventory against the known-vehicle baseline
//! - Dispatching notifications for new vehicles
//! - Persisting the baseline after each successful target
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ PollScheduler│── tick() ── per target ──┐
//! └──────────────┘                          │
//!                                           ▼
//!                                  ┌──────────────┐
//!                                  │  CodeMerger  │── ExhibitionSource × codes
//!                                  └──────────────┘
//!                                           │
//!         ┌─────────────────────────────────┼──────────────────────────┐
//!         │                                 │                          │
//!         ▼                                 ▼                          ▼
//! ┌─────────────┐                 ┌──────────────────┐         ┌─────────────┐
//! │ DiffEngine  │                 │ Notification     │         │ StatusBoard │
//! │ + StateStore│                 │ Dispatcher       │         │  + Events   │
//! └─────────────┘                 └──────────────────┘         └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Merge all codes for the target
//! 2. On total failure, record the failure status and leave the baseline untouched
//! 3. Cold start: register the current ids, notify nothing. Codes that failed
//!    in that cycle have their first successful listing absorbed silently too
//! 4. Otherwise notify each new id, then merge ids into the baseline
//! 5. Persist the baseline; a write failure is logged and the cycle continues

pub mod pacing;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{TargetConfig, WatchConfig};
use crate::diff::DiffEngine;
use crate::error::Result;
use crate::merge::{CodeMerger, CodeStatus, MergeResult};
use crate::model::KnownState;
use crate::notify::NotificationDispatcher;
use crate::report::StatusBoard;
use crate::traits::{ChannelTransport, ExhibitionSource, KnownStateStore, Transcript};

pub use pacing::{FixedJitter, JitterSource, Pacing, RandomJitter};

/// Events emitted by the PollScheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Scheduler started
    Started {
        targets_count: usize,
    },

    /// First successful cycle of a target registered its baseline
    BaselineRegistered {
        exhb_no: String,
        count: usize,
    },

    /// New vehicle found and dispatched
    VehicleDiscovered {
        exhb_no: String,
        vehicle_id: String,
        delivered: bool,
    },

    /// Every code call of a target failed
    TargetFailed {
        exhb_no: String,
        reason: String,
    },

    /// Baseline could not be written; continuing in memory
    PersistenceFailed {
        error: String,
    },

    /// Scheduler stopped
    Stopped {
        reason: String,
    },
}

/// Outcome of one target within one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PollCycleResult {
    /// Exhibition id
    pub exhb_no: String,
    /// Display label
    pub label: String,
    /// At least one code call succeeded
    pub success: bool,
    /// Merged identifiers, in order
    pub current_ids: Vec<String>,
    /// One status per code call
    pub per_code_status: Vec<CodeStatus>,
    /// Transcripts of every code call
    pub transcripts: Vec<(Option<String>, Transcript)>,
    /// Identifiers notified this cycle
    pub new_ids: Vec<String>,
    /// The target had no baseline before this cycle
    pub cold_start: bool,
    /// `"200 OK | {n}대"` or `"FAIL: {reason}"`
    pub status_line: String,
}

/// Polling scheduler
///
/// Owns the in-memory baseline; it is the only writer of [`KnownState`].
///
/// ## Lifecycle
///
/// 1. Create with [`PollScheduler::new()`]
/// 2. Drive cycles with [`PollScheduler::tick()`] or loop with
///    [`PollScheduler::run_with_shutdown()`]
/// 3. The baseline is loaded on the first cycle and flushed on shutdown
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped (logged) when full
/// - **Sequential work**: targets and codes are processed one at a time
pub struct PollScheduler {
    source: Arc<dyn ExhibitionSource>,
    dispatcher: NotificationDispatcher,
    store: Box<dyn KnownStateStore>,
    targets: Vec<TargetConfig>,
    vehicle_codes: Vec<String>,
    pacing: Pacing,
    board: Arc<StatusBoard>,
    known: Option<KnownState>,
    /// Codes that failed during a target's cold-start cycle
    warming: HashMap<String, HashSet<Option<String>>>,
    event_tx: mpsc::Sender<WatchEvent>,
}

impl PollScheduler {
    /// Create a new scheduler
    ///
    /// # Parameters
    ///
    /// - `source`: Exhibition source (the vendor API client)
    /// - `transport`: Channel transport for notifications
    /// - `store`: Known-state store
    /// - `config`: Watcher configuration
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, event_receiver)
    pub fn new(
        source: Arc<dyn ExhibitionSource>,
        transport: Arc<dyn ChannelTransport>,
        store: Box<dyn KnownStateStore>,
        config: &WatchConfig,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.poll.event_channel_capacity);

        let scheduler = Self {
            source,
            dispatcher: NotificationDispatcher::new(
                transport,
                config.discord.integrated_channel_id,
                config.api.detail_base_url.clone(),
            ),
            store,
            targets: config.targets.clone(),
            vehicle_codes: config.vehicle_codes.clone(),
            pacing: Pacing::new(
                Duration::from_secs(config.poll.interval_secs),
                Duration::from_millis(config.poll.jitter_max_ms),
            ),
            board: Arc::new(StatusBoard::new(&config.targets)),
            known: None,
            warming: HashMap::new(),
            event_tx: tx,
        };

        Ok((scheduler, rx))
    }

    /// Replace the pacing jitter source
    pub fn with_jitter_source(mut self, source: Box<dyn JitterSource>) -> Self {
        self.pacing = self.pacing.with_jitter_source(source);
        self
    }

    /// Shared status board, for the status reporter
    pub fn status_board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.board)
    }

    /// In-memory baseline (`None` before the first cycle)
    pub fn known_state(&self) -> Option<&KnownState> {
        self.known.as_ref()
    }

    /// Run one cycle over all targets
    pub async fn tick(&mut self) -> Vec<PollCycleResult> {
        self.ensure_loaded().await;
        self.board.record_poll().await;

        let targets = self.targets.clone();
        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            results.push(self.poll_target(target).await);
        }
        results
    }

    /// Run cycles until the shutdown signal fires
    ///
    /// Shutdown is observed between cycles only; an in-flight cycle always
    /// completes. `None` runs until the process is terminated.
    pub async fn run_with_shutdown(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(WatchEvent::Started {
            targets_count: self.targets.len(),
        });

        let mut shutdown_rx = shutdown_rx;
        loop {
            let started = Instant::now();
            self.tick().await;

            // Start-to-start pacing; an overrunning cycle is followed immediately
            let delay = self.pacing.next_delay();
            let next_start = started + delay;
            debug!(
                "Next cycle in {:?}",
                next_start.saturating_duration_since(Instant::now())
            );

            match shutdown_rx.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        biased;
                        _ = rx => {
                            info!("Shutdown signal received");
                            break;
                        }
                        _ = tokio::time::sleep_until(next_start) => {}
                    }
                }
                None => tokio::time::sleep_until(next_start).await,
            }
        }

        self.emit_event(WatchEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        self.flush().await?;
        info!("State flushed, scheduler stopped");
        Ok(())
    }

    /// Write the in-memory baseline to the store
    pub async fn flush(&self) -> Result<()> {
        match &self.known {
            Some(known) => self.store.save(known).await,
            None => Ok(()),
        }
    }

    async fn ensure_loaded(&mut self) {
        if self.known.is_some() {
            return;
        }

        let known = match self.store.load().await {
            Ok(known) => known,
            Err(e) => {
                error!("Failed to load known state, starting empty: {}", e);
                KnownState::new()
            }
        };

        for target in &self.targets {
            self.board
                .set_known_count(&target.exhb_no, known.count(&target.exhb_no))
                .await;
        }
        info!(
            "Known state loaded: {} of {} target(s) registered",
            self.targets
                .iter()
                .filter(|t| known.contains_target(&t.exhb_no))
                .count(),
            self.targets.len()
        );
        self.known = Some(known);
    }

    async fn poll_target(&mut self, target: &TargetConfig) -> PollCycleResult {
        let merged = CodeMerger::new(self.source.as_ref(), &self.vehicle_codes)
            .merge_all(target)
            .await;
        let transcript = merged.combined_transcript();
        debug!("[{}] transcript:\n{}", target.label, transcript);

        let mut result = PollCycleResult {
            exhb_no: target.exhb_no.clone(),
            label: target.label.clone(),
            success: merged.any_success,
            current_ids: merged.ids(),
            per_code_status: merged.per_code_status.clone(),
            transcripts: merged.transcripts.clone(),
            new_ids: Vec::new(),
            cold_start: false,
            status_line: String::new(),
        };

        if !merged.any_success {
            let reason = merged
                .failure_summary()
                .unwrap_or_else(|| "no response".to_string());
            warn!("[{}] all codes failed: {}", target.label, reason);
            result.status_line = format!("FAIL: {}", reason);
            self.board
                .record_target(&target.exhb_no, result.status_line.clone(), transcript, None)
                .await;
            self.emit_event(WatchEvent::TargetFailed {
                exhb_no: target.exhb_no.clone(),
                reason,
            });
            return result;
        }

        result.status_line = format!("200 OK | {}대", merged.reported_total());
        if let Some(partial) = merged.failure_summary() {
            warn!("[{}] partial failure: {}", target.label, partial);
        }

        let mut known = self.known.take().unwrap_or_default();
        let outcome = DiffEngine::diff(&known, &target.exhb_no, &result.current_ids);
        result.cold_start = outcome.is_cold_start;

        if outcome.is_cold_start {
            let failed: HashSet<Option<String>> = merged
                .per_code_status
                .iter()
                .filter(|s| s.result.is_err())
                .map(|s| s.code.clone())
                .collect();
            if !failed.is_empty() {
                self.warming.insert(target.exhb_no.clone(), failed);
            }
            info!(
                "[{}] baseline registered: {} vehicle(s) (total: {})",
                target.label,
                result.current_ids.len(),
                merged.reported_total()
            );
            self.emit_event(WatchEvent::BaselineRegistered {
                exhb_no: target.exhb_no.clone(),
                count: result.current_ids.len(),
            });
        } else {
            let absorbed = self.absorb_recovered_codes(target, &merged);
            let new_ids: Vec<String> = outcome
                .new_ids
                .into_iter()
                .filter(|id| !absorbed.contains(id))
                .collect();

            if new_ids.is_empty() {
                info!(
                    "[{}] no change ({} vehicle(s), total: {})",
                    target.label,
                    result.current_ids.len(),
                    merged.reported_total()
                );
            } else {
                info!("[{}] {} new vehicle(s) found", target.label, new_ids.len());
                for id in &new_ids {
                    let Some(vehicle) = merged.vehicles.iter().find(|v| v.id().as_ref() == Some(id))
                    else {
                        continue;
                    };
                    let report = self.dispatcher.notify(vehicle, target).await;
                    self.emit_event(WatchEvent::VehicleDiscovered {
                        exhb_no: target.exhb_no.clone(),
                        vehicle_id: id.clone(),
                        delivered: report.all_delivered(),
                    });
                }
                self.board.record_event(&target.label, new_ids.len()).await;
                result.new_ids = new_ids;
            }
        }

        DiffEngine::apply(&mut known, &target.exhb_no, &result.current_ids);
        if let Err(e) = self.store.save(&known).await {
            error!("[{}] failed to persist known state: {}", target.label, e);
            self.emit_event(WatchEvent::PersistenceFailed {
                error: e.to_string(),
            });
        }

        let known_count = known.count(&target.exhb_no);
        self.known = Some(known);

        self.board
            .record_target(
                &target.exhb_no,
                result.status_line.clone(),
                transcript,
                Some(known_count),
            )
            .await;

        result
    }

    /// Identifiers to register without notifying, from codes recovering
    /// after failing in the target's cold-start cycle
    ///
    /// Ids also listed by a code that was healthy at cold start are not
    /// absorbed.
    fn absorb_recovered_codes(
        &mut self,
        target: &TargetConfig,
        merged: &MergeResult,
    ) -> HashSet<String> {
        let Some(pending) = self.warming.get_mut(&target.exhb_no) else {
            return HashSet::new();
        };

        let succeeded = merged.per_code_status.iter().filter(|s| s.result.is_ok());
        let (recovered, healthy): (Vec<_>, Vec<_>) =
            succeeded.partition(|s| pending.contains(&s.code));
        if recovered.is_empty() {
            return HashSet::new();
        }

        let healthy_ids: HashSet<&str> = healthy
            .iter()
            .flat_map(|s| merged.ids_listed_by(s.code.as_deref()))
            .map(String::as_str)
            .collect();
        let absorbed: HashSet<String> = recovered
            .iter()
            .flat_map(|s| merged.ids_listed_by(s.code.as_deref()))
            .filter(|id| !healthy_ids.contains(id.as_str()))
            .cloned()
            .collect();

        for status in &recovered {
            pending.remove(&status.code);
            info!(
                "[{}] code {} recovered after cold start, baseline extended",
                target.label,
                status.code.as_deref().unwrap_or("*")
            );
        }
        if pending.is_empty() {
            self.warming.remove(&target.exhb_no);
        }

        absorbed
    }

    /// Emit a scheduler event
    fn emit_event(&self, event: WatchEvent) {
        // Non-blocking; a full channel drops the event
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing eventChannelCapacity.");
        }
    }
}
