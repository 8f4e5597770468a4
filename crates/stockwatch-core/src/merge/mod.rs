//! Per-code fetch and merge
//!
//! The vendor API fragments inventory by vehicle code, so one target is
//! fetched once per whitelisted code. Calls run sequentially and failures
//! are isolated per code.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::TargetConfig;
use crate::error::FetchError;
use crate::model::VehicleRecord;
use crate::traits::{ExhibitionSource, Transcript};

/// Outcome of one code's call within a merge
#[derive(Debug, Clone, PartialEq)]
pub struct CodeStatus {
    /// Code used as override (`None` when no whitelist is configured)
    pub code: Option<String>,
    /// Vehicle count and vendor total, or the failure kind
    pub result: Result<CodeCounts, FetchError>,
}

/// Counts reported by one successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeCounts {
    /// Vehicles in the response
    pub returned: usize,
    /// Vendor-reported total
    pub total: u64,
    /// Identifiers listed by this call, before dedup and filtering
    pub ids: Vec<String>,
}

impl CodeStatus {
    fn label(&self) -> &str {
        self.code.as_deref().unwrap_or("*")
    }
}

/// Merged inventory for one target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    /// Deduplicated vehicles that passed the whitelist filter, first-seen order
    pub vehicles: Vec<VehicleRecord>,
    /// One entry per code call, in call order
    pub per_code_status: Vec<CodeStatus>,
    /// At least one call returned a non-error result
    pub any_success: bool,
    /// Transcripts of every call, in call order
    pub transcripts: Vec<(Option<String>, Transcript)>,
}

impl MergeResult {
    /// Identifiers of the merged vehicles, in order
    pub fn ids(&self) -> Vec<String> {
        self.vehicles.iter().filter_map(VehicleRecord::id).collect()
    }

    /// Sum of vendor-reported totals over successful calls
    pub fn reported_total(&self) -> u64 {
        self.per_code_status
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .map(|c| c.total)
            .sum()
    }

    /// Identifiers listed by a successful call for `code`
    ///
    /// Empty when the code failed or was not called.
    pub fn ids_listed_by(&self, code: Option<&str>) -> &[String] {
        self.per_code_status
            .iter()
            .find(|s| s.code.as_deref() == code)
            .and_then(|s| s.result.as_ref().ok())
            .map(|c| c.ids.as_slice())
            .unwrap_or(&[])
    }

    /// Human-readable failure summary, e.g. `"AX05: HTTP 503; AX06: spoofed success"`
    pub fn failure_summary(&self) -> Option<String> {
        let failures: Vec<String> = self
            .per_code_status
            .iter()
            .filter_map(|s| s.result.as_ref().err().map(|e| format!("{}: {}", s.label(), e)))
            .collect();
        (!failures.is_empty()).then(|| failures.join("; "))
    }

    /// Transcripts joined with a per-code header
    pub fn combined_transcript(&self) -> String {
        self.transcripts
            .iter()
            .map(|(code, t)| format!("[{}]\n{}", code.as_deref().unwrap_or("*"), t))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Issues one source call per whitelisted code and merges the results
pub struct CodeMerger<'a> {
    source: &'a dyn ExhibitionSource,
    codes: &'a [String],
}

impl<'a> CodeMerger<'a> {
    /// Create a merger over a source and a vehicle-code whitelist
    pub fn new(source: &'a dyn ExhibitionSource, codes: &'a [String]) -> Self {
        Self { source, codes }
    }

    /// Fetch every code for the target and merge the results
    ///
    /// Dedup is by identifier, first occurrence wins. Records without an
    /// identifier are dropped. The whitelist filter is applied after
    /// the merge.
    pub async fn merge_all(&self, target: &TargetConfig) -> MergeResult {
        let calls: Vec<Option<&str>> = if self.codes.is_empty() {
            vec![None]
        } else {
            self.codes.iter().map(|c| Some(c.as_str())).collect()
        };

        let mut result = MergeResult::default();
        let mut seen = HashSet::new();

        for code in calls {
            let outcome = self.source.fetch(target, code).await;
            let code_owned = code.map(str::to_string);

            let status = match outcome.result {
                Ok(page) => {
                    result.any_success = true;
                    let returned = page.vehicles.len();
                    let mut ids = Vec::with_capacity(returned);
                    for vehicle in page.vehicles {
                        let Some(id) = vehicle.id() else {
                            debug!("[{}] dropping vehicle without identifier", target.label);
                            continue;
                        };
                        ids.push(id.clone());
                        if seen.insert(id) {
                            result.vehicles.push(vehicle);
                        }
                    }
                    Ok(CodeCounts {
                        returned,
                        total: page.total,
                        ids,
                    })
                }
                Err(e) => {
                    warn!(
                        "[{}] code {} failed ({}): {}",
                        target.label,
                        code.unwrap_or("*"),
                        e.kind(),
                        e
                    );
                    Err(e)
                }
            };

            result.per_code_status.push(CodeStatus {
                code: code_owned.clone(),
                result: status,
            });
            result.transcripts.push((code_owned, outcome.transcript));
        }

        result.vehicles.retain(|v| passes_whitelist(v, self.codes));
        result
    }
}

/// Whitelist filter: passes if the vehicle's type code is whitelisted, or if
/// it carries no type code at all
///
/// An empty whitelist passes everything.
pub fn passes_whitelist(vehicle: &VehicleRecord, codes: &[String]) -> bool {
    if codes.is_empty() {
        return true;
    }
    match vehicle.car_code() {
        Some(code) => codes.iter().any(|c| *c == code),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ExhibitionPage, FetchOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedSource {
        pages: HashMap<Option<String>, Result<Vec<serde_json::Value>, FetchError>>,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with(mut self, code: Option<&str>, page: Result<Vec<serde_json::Value>, FetchError>) -> Self {
            self.pages.insert(code.map(str::to_string), page);
            self
        }
    }

    #[async_trait]
    impl ExhibitionSource for ScriptedSource {
        async fn fetch(&self, _target: &TargetConfig, car_code: Option<&str>) -> FetchOutcome {
            let key = car_code.map(str::to_string);
            self.calls.lock().unwrap().push(key.clone());
            let mut transcript = Transcript::new();
            transcript.push(format!(">>> code {:?}", key));
            match self.pages.get(&key).cloned() {
                Some(Ok(values)) => {
                    let vehicles: Vec<_> = values.into_iter().filter_map(VehicleRecord::from_value).collect();
                    let total = vehicles.len() as u64;
                    FetchOutcome::ok(ExhibitionPage { vehicles, total }, transcript)
                }
                Some(Err(e)) => FetchOutcome::err(e, transcript),
                None => FetchOutcome::err(FetchError::Http { status: 404 }, transcript),
            }
        }

        fn source_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn codes(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn target() -> TargetConfig {
        TargetConfig::new("E01", "특별기획전", 2001)
    }

    #[tokio::test]
    async fn test_dedup_first_occurrence_wins() {
        let source = ScriptedSource::new()
            .with(Some("AX05"), Ok(vec![json!({"vehicleId": "V1", "carCode": "AX05", "price": 1})]))
            .with(
                Some("AX06"),
                Ok(vec![
                    json!({"vehicleId": "V1", "carCode": "AX05", "price": 2}),
                    json!({"vehicleId": "V2", "carCode": "AX06"}),
                ]),
            );
        let whitelist = codes(&["AX05", "AX06"]);

        let merged = CodeMerger::new(&source, &whitelist).merge_all(&target()).await;

        assert!(merged.any_success);
        assert_eq!(merged.ids(), vec!["V1", "V2"]);
        assert_eq!(merged.vehicles[0].price(), Some(1.0));
        assert_eq!(merged.ids_listed_by(Some("AX05")), ["V1"]);
        assert_eq!(merged.ids_listed_by(Some("AX06")), ["V1", "V2"]);
        assert_eq!(*source.calls.lock().unwrap(), vec![Some("AX05".to_string()), Some("AX06".to_string())]);
    }

    #[tokio::test]
    async fn test_transport_failure_isolated() {
        let source = ScriptedSource::new()
            .with(Some("AX05"), Err(FetchError::Transport("timeout".into())))
            .with(Some("AX06"), Ok(vec![json!({"vehicleId": "V2", "carCode": "AX06"})]));
        let whitelist = codes(&["AX05", "AX06"]);

        let merged = CodeMerger::new(&source, &whitelist).merge_all(&target()).await;

        assert!(merged.any_success);
        assert_eq!(merged.ids(), vec!["V2"]);
        assert_eq!(merged.per_code_status.len(), 2);
        assert!(merged.per_code_status[0].result.is_err());
        assert!(merged.ids_listed_by(Some("AX05")).is_empty());
        assert_eq!(
            merged.failure_summary().as_deref(),
            Some("AX05: request failed: timeout")
        );
        assert_eq!(merged.transcripts.len(), 2);
    }

    #[tokio::test]
    async fn test_all_failures_is_total_failure() {
        let source = ScriptedSource::new()
            .with(Some("AX05"), Err(FetchError::EvasionDetected))
            .with(Some("AX06"), Err(FetchError::Http { status: 503 }));
        let whitelist = codes(&["AX05", "AX06"]);

        let merged = CodeMerger::new(&source, &whitelist).merge_all(&target()).await;

        assert!(!merged.any_success);
        assert!(merged.vehicles.is_empty());
        assert_eq!(
            merged.failure_summary().as_deref(),
            Some("AX05: spoofed success (empty data payload); AX06: HTTP 503")
        );
    }

    #[tokio::test]
    async fn test_empty_success_counts_as_success() {
        let source = ScriptedSource::new().with(Some("AX05"), Ok(vec![]));
        let whitelist = codes(&["AX05"]);

        let merged = CodeMerger::new(&source, &whitelist).merge_all(&target()).await;

        assert!(merged.any_success);
        assert!(merged.vehicles.is_empty());
    }

    #[tokio::test]
    async fn test_empty_whitelist_single_call() {
        let source = ScriptedSource::new().with(None, Ok(vec![json!({"vehicleId": "V1", "carCode": "ZZ99"})]));

        let merged = CodeMerger::new(&source, &[]).merge_all(&target()).await;

        assert_eq!(*source.calls.lock().unwrap(), vec![None]);
        assert_eq!(merged.ids(), vec!["V1"]);
    }

    #[tokio::test]
    async fn test_records_without_identifier_dropped() {
        let source = ScriptedSource::new()
            .with(Some("AX05"), Ok(vec![json!({"modelNm": "x"}), json!({"vin": "K1"})]));
        let whitelist = codes(&["AX05"]);

        let merged = CodeMerger::new(&source, &whitelist).merge_all(&target()).await;
        assert_eq!(merged.ids(), vec!["K1"]);
    }

    #[test]
    fn test_whitelist_fails_open_on_missing_code() {
        let whitelist = codes(&["AX05"]);
        let listed = VehicleRecord::from_value(json!({"carCode": "AX05"})).unwrap();
        let other = VehicleRecord::from_value(json!({"carCode": "AX01"})).unwrap();
        let untyped = VehicleRecord::from_value(json!({"vehicleId": "V"})).unwrap();

        assert!(passes_whitelist(&listed, &whitelist));
        assert!(!passes_whitelist(&other, &whitelist));
        assert!(passes_whitelist(&untyped, &whitelist));
        assert!(passes_whitelist(&other, &[]));
    }
}
