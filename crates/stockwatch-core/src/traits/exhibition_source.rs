// # Exhibition Source Trait
//
// Defines the interface for fetching one page of exhibition inventory, and
// the evasion-token provider the HTTP implementation consults before each
// request.
//
// ## Implementations
//
// - Vendor listing API: `stockwatch-source-http` crate
// - Scripted sources in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use stockwatch_core::ExhibitionSource;
//
// let outcome = source.fetch(&target, Some("AX05")).await;
// match outcome.result {
//     Ok(page) => println!("{} vehicles", page.vehicles.len()),
//     Err(e) => eprintln!("{}\n{}", e, outcome.transcript),
// }
// ```

use async_trait::async_trait;
use std::fmt;

use crate::config::TargetConfig;
use crate::error::FetchError;
use crate::model::VehicleRecord;

/// One successfully parsed listing response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExhibitionPage {
    /// Vehicles in response order
    pub vehicles: Vec<VehicleRecord>,
    /// Vendor-reported total count
    pub total: u64,
}

/// Structured request/response log of one API call
///
/// Produced on every call path, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Recorded lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}

/// Result of one exhibition API call, with its transcript
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Parsed page or failure kind
    pub result: Result<ExhibitionPage, FetchError>,
    /// Request/response transcript
    pub transcript: Transcript,
}

impl FetchOutcome {
    /// Successful outcome
    pub fn ok(page: ExhibitionPage, transcript: Transcript) -> Self {
        Self {
            result: Ok(page),
            transcript,
        }
    }

    /// Failed outcome
    pub fn err(error: FetchError, transcript: Transcript) -> Self {
        Self {
            result: Err(error),
            transcript,
        }
    }
}

/// Trait for exhibition inventory sources
///
/// # Trust Level: Untrusted
///
/// Sources are isolated, single-shot components:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to the vendor endpoints only
/// - ✅ Parse vendor-specific responses
/// - ✅ Return success or a failure kind (scheduler owns isolation)
///
/// ## Forbidden Capabilities
/// - ❌ Retry within a call (the next cycle is the retry mechanism)
/// - ❌ Access the known-state store
/// - ❌ Cache tokens or responses between calls
/// - ❌ Decide whether a vehicle is new
#[async_trait]
pub trait ExhibitionSource: Send + Sync {
    /// Fetch the current inventory of one exhibition
    ///
    /// # Parameters
    ///
    /// - `target`: The exhibition and its payload overrides
    /// - `car_code`: Vehicle-code override for this call; wins over the
    ///   target's own `carCode`
    ///
    /// # Returns
    ///
    /// A [`FetchOutcome`]; never panics or raises, every failure is a value.
    async fn fetch(&self, target: &TargetConfig, car_code: Option<&str>) -> FetchOutcome;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Trait for anti-bot evasion token providers
///
/// Every call must perform a fresh acquisition: the vendor invalidates
/// reused tokens. `None` means "proceed without the token header".
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Acquire a fresh token
    async fn acquire(&self) -> Option<String>;
}
