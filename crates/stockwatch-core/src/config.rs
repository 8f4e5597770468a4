//! Configuration types for the inventory watcher
//!
//! The configuration is a camelCase JSON document. Channel ids are accepted
//! as JSON strings or numbers, colors as `"0x3B82F6"`, `"#3B82F6"` or numbers.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Main watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Notification channel credentials and destinations
    pub discord: DiscordConfig,

    /// Vendor API settings
    pub api: ApiConfig,

    /// Whitelisted vehicle-type codes
    ///
    /// Each code is requested separately per target. Empty means one
    /// request per target with no code override and no post-merge filter.
    #[serde(default)]
    pub vehicle_codes: Vec<String>,

    /// Polling loop settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Known-state persistence settings
    #[serde(default)]
    pub state: StateConfig,

    /// Deployment update log reported once at startup
    #[serde(default)]
    pub update_log_path: Option<String>,

    /// Exhibitions to watch
    pub targets: Vec<TargetConfig>,
}

impl WatchConfig {
    /// Parse a configuration document
    pub fn from_json_str(raw: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(raw)
            .map_err(|e| crate::Error::config(format!("Invalid configuration: {}", e)))
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&raw)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.targets.is_empty() {
            return Err(crate::Error::config("No targets configured"));
        }

        self.discord.validate()?;
        self.api.validate()?;
        self.poll.validate()?;

        let mut seen = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !seen.insert(target.exhb_no.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate target exhbNo: {}",
                    target.exhb_no
                )));
            }
        }

        if self.vehicle_codes.iter().any(|c| c.trim().is_empty()) {
            return Err(crate::Error::config("Vehicle codes cannot be empty strings"));
        }

        Ok(())
    }
}

/// Discord credentials and channel ids
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Bot token
    /// ⚠️ NEVER log this value
    pub token: String,

    /// Cross-target aggregate channel
    #[serde(deserialize_with = "de_snowflake")]
    pub integrated_channel_id: u64,

    /// Channel for periodic status summaries
    #[serde(default, deserialize_with = "de_opt_snowflake")]
    pub status_channel_id: Option<u64>,

    /// Channel for deployment update reports
    #[serde(default, deserialize_with = "de_opt_snowflake")]
    pub update_log_channel_id: Option<u64>,

    /// REST API base
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,
}

impl DiscordConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.token.trim().is_empty() {
            return Err(crate::Error::config("Discord token cannot be empty"));
        }
        if self.integrated_channel_id == 0 {
            return Err(crate::Error::config("Integrated channel id must be set"));
        }
        Ok(())
    }
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<REDACTED>")
            .field("integrated_channel_id", &self.integrated_channel_id)
            .field("status_channel_id", &self.status_channel_id)
            .field("update_log_channel_id", &self.update_log_channel_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Vendor API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Exhibition listing endpoint; the exhbNo is appended as a path segment
    pub base_url: String,

    /// Layout-sync endpoint used as the evasion token source
    #[serde(default)]
    pub layout_sync_url: Option<String>,

    /// Fields sent with every listing request
    #[serde(default)]
    pub default_payload: serde_json::Map<String, serde_json::Value>,

    /// Caller-supplied base headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Header carrying the evasion token
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Referer template; `{exhbNo}` is replaced with the exhibition id
    #[serde(default)]
    pub referer_template: Option<String>,

    /// Base of the purchase/detail link in notifications
    #[serde(default = "default_detail_base_url")]
    pub detail_base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Create an API configuration with defaults for everything but the base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            layout_sync_url: None,
            default_payload: serde_json::Map::new(),
            headers: BTreeMap::new(),
            token_header: default_token_header(),
            referer_template: None,
            detail_base_url: default_detail_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.base_url.trim().is_empty() {
            return Err(crate::Error::config("API base URL cannot be empty"));
        }
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "API base URL must use HTTP or HTTPS scheme. Got: {}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("API timeout must be > 0"));
        }
        if self.token_header.trim().is_empty() {
            return Err(crate::Error::config("Token header name cannot be empty"));
        }
        Ok(())
    }
}

/// Polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    /// Base interval between cycles (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound of the random jitter added to each interval (in milliseconds)
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Interval between status summaries (in seconds)
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// Capacity of the scheduler event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl PollConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.status_interval_secs == 0 {
            return Err(crate::Error::config("Status interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            jitter_max_ms: default_jitter_max_ms(),
            status_interval_secs: default_status_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Known-state persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    /// Path to the known-vehicles file
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// One watched exhibition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// Exhibition id
    pub exhb_no: String,

    /// Display label
    pub label: String,

    /// Target-specific delivery channel
    #[serde(deserialize_with = "de_snowflake")]
    pub channel_id: u64,

    /// Embed accent color
    #[serde(default = "default_color", deserialize_with = "de_color")]
    pub color: u32,

    /// Sparse request payload overrides
    #[serde(flatten)]
    pub overrides: PayloadOverrides,
}

impl TargetConfig {
    /// Create a target with the default color and no overrides
    pub fn new(exhb_no: impl Into<String>, label: impl Into<String>, channel_id: u64) -> Self {
        Self {
            exhb_no: exhb_no.into(),
            label: label.into(),
            channel_id,
            color: default_color(),
            overrides: PayloadOverrides::default(),
        }
    }

    /// Set the accent color
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Set the payload overrides
    pub fn with_overrides(mut self, overrides: PayloadOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.exhb_no.trim().is_empty() {
            return Err(crate::Error::config("Target exhbNo cannot be empty"));
        }
        if self.channel_id == 0 {
            return Err(crate::Error::config(format!(
                "Target {} has no channel id",
                self.exhb_no
            )));
        }
        Ok(())
    }
}

/// Request payload fields a target may override
///
/// Only fields that are present are applied; absent or `null` fields keep
/// the default payload's value. Values are copied as given, so
/// `"subsidyRegion": 2600` stays a number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_code: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_area_code: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_local_area_code: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsidy_region: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_center_code: Option<serde_json::Value>,
}

impl PayloadOverrides {
    /// Write every present field into `payload`
    pub fn apply(&self, payload: &mut serde_json::Map<String, serde_json::Value>) {
        let fields = [
            ("carCode", &self.car_code),
            ("deliveryAreaCode", &self.delivery_area_code),
            ("deliveryLocalAreaCode", &self.delivery_local_area_code),
            ("subsidyRegion", &self.subsidy_region),
            ("deliveryCenterCode", &self.delivery_center_code),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                payload.insert(key.to_string(), value.clone());
            }
        }
    }
}

/// Parse a display color such as `0x3B82F6`, `#3B82F6` or `3B82F6`
pub fn parse_color(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed);
    u32::from_str_radix(hex, 16).ok().filter(|c| *c <= 0xFF_FF_FF)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn de_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid channel id: {}", s))),
    }
}

fn de_opt_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid channel id: {}", s))),
    }
}

fn de_color<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => u32::try_from(n)
            .ok()
            .filter(|c| *c <= 0xFF_FF_FF)
            .ok_or_else(|| serde::de::Error::custom(format!("color out of range: {}", n))),
        NumberOrText::Text(s) => parse_color(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color: {}", s))),
    }
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_token_header() -> String {
    "x-layout-hash".to_string()
}

fn default_detail_base_url() -> String {
    "https://casper.hyundai.com/vehicles/detail".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    3
}

fn default_jitter_max_ms() -> u64 {
    990
}

fn default_status_interval_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_state_path() -> String {
    "data/known_vehicles.json".to_string()
}

fn default_color() -> u32 {
    0x3B82F6
}
