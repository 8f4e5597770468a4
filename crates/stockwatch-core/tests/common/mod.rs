//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without touching the network.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stockwatch_core::error::{Error, FetchError};
use stockwatch_core::traits::{
    ChannelTransport, ExhibitionPage, ExhibitionSource, FetchOutcome, OutboundMessage, Transcript,
};
use stockwatch_core::{TargetConfig, VehicleRecord, WatchConfig};

/// Aggregate channel used by [`minimal_config`]
pub const AGGREGATE_CHANNEL: u64 = 1000;

type ScriptKey = (String, Option<String>);

/// An ExhibitionSource whose responses are scripted per (exhibition, code)
///
/// Clones share the script and counters, so a test can change responses
/// between cycles while the scheduler owns another handle.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<HashMap<ScriptKey, Result<Vec<Value>, FetchError>>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful response
    pub fn respond(&self, exhb_no: &str, code: Option<&str>, vehicles: Vec<Value>) {
        self.script
            .lock()
            .unwrap()
            .insert((exhb_no.to_string(), code.map(str::to_string)), Ok(vehicles));
    }

    /// Script a failed response
    pub fn fail(&self, exhb_no: &str, code: Option<&str>, error: FetchError) {
        self.script
            .lock()
            .unwrap()
            .insert((exhb_no.to_string(), code.map(str::to_string)), Err(error));
    }

    /// Get the number of fetch() calls
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ExhibitionSource for ScriptedSource {
    async fn fetch(&self, target: &TargetConfig, car_code: Option<&str>) -> FetchOutcome {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let key = (target.exhb_no.clone(), car_code.map(str::to_string));
        let mut transcript = Transcript::new();
        transcript.push(format!(">>> POST {}/{:?}", key.0, key.1));

        let scripted = self.script.lock().unwrap().get(&key).cloned();
        match scripted {
            Some(Ok(values)) => {
                transcript.push(format!("<<< 200 ({} vehicles)", values.len()));
                let vehicles: Vec<_> = values
                    .into_iter()
                    .filter_map(VehicleRecord::from_value)
                    .collect();
                let total = vehicles.len() as u64;
                FetchOutcome::ok(ExhibitionPage { vehicles, total }, transcript)
            }
            Some(Err(e)) => {
                transcript.push(format!("!!! {}", e));
                FetchOutcome::err(e, transcript)
            }
            None => FetchOutcome::err(FetchError::Transport("unscripted".into()), transcript),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A ChannelTransport that records deliveries and fails on chosen channels
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(u64, OutboundMessage)>>>,
    failing: Arc<Mutex<HashSet<u64>>>,
    send_attempts: Arc<AtomicUsize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to a channel fail
    pub fn fail_channel(&self, channel_id: u64) {
        self.failing.lock().unwrap().insert(channel_id);
    }

    /// Successfully delivered messages
    pub fn sent(&self) -> Vec<(u64, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivered messages for one channel
    pub fn sent_to(&self, channel_id: u64) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, m)| m)
            .collect()
    }

    /// All send attempts, including failures
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChannelTransport for RecordingTransport {
    async fn send(&self, channel_id: u64, message: &OutboundMessage) -> Result<(), Error> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&channel_id) {
            return Err(Error::delivery(channel_id, "Missing Access"));
        }
        self.sent.lock().unwrap().push((channel_id, message.clone()));
        Ok(())
    }

    async fn ready(&self) -> Result<(), Error> {
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "recording"
    }
}

/// A vehicle object as returned by the vendor API
pub fn vehicle(id: &str, car_code: &str) -> Value {
    json!({
        "vehicleId": id,
        "carCode": car_code,
        "modelNm": "캐스퍼 일렉트릭",
        "trimNm": "인스퍼레이션",
        "price": 35040000
    })
}

/// Create a minimal valid config
///
/// Targets are `(exhbNo, channelId)` pairs.
pub fn minimal_config(targets: &[(&str, u64)], vehicle_codes: &[&str]) -> WatchConfig {
    let targets: Vec<Value> = targets
        .iter()
        .map(|(exhb_no, channel_id)| {
            json!({
                "exhbNo": exhb_no,
                "label": format!("기획전 {}", exhb_no),
                "channelId": channel_id.to_string(),
            })
        })
        .collect();

    let raw = json!({
        "discord": {
            "token": "test-token",
            "integratedChannelId": AGGREGATE_CHANNEL.to_string(),
        },
        "api": {
            "baseUrl": "http://vendor.invalid/exhibition",
        },
        "vehicleCodes": vehicle_codes,
        "poll": {
            "intervalSecs": 1,
            "jitterMaxMs": 0,
        },
        "targets": targets,
    });

    WatchConfig::from_json_str(&raw.to_string()).expect("minimal config parses")
}
