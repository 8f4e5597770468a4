// # HTTP Exhibition Source
//
// This crate provides the vendor listing API client for the inventory watcher.
//
// ## Purpose
//
// Fetches one exhibition's inventory per call, surviving the vendor's
// anti-automation layer:
//
// - ✅ Fresh evasion token per request (see [`LayoutTokenProvider`])
// - ✅ Evasion headers (`Cache-Control`, `Pragma`, `X-Requested-With`, `Referer`)
// - ✅ Cache-busting `t=<epoch ms>` query parameter
// - ✅ Spoofed-success detection (success code with an empty payload)
// - ✅ Transcript of every call, successful or not
// - ❌ NO retry logic (the next polling cycle is the retry)
// - ❌ NO caching of tokens or responses
// - ❌ NO background tasks
//
// ## API Reference
//
// - Listing: POST `{baseUrl}/{exhbNo}?t={epoch_ms}` with a JSON payload
// - Response: `{"rspStatus": {"rspCode", "rspMessage"}, "data": {"list" | "discountsearchcars", "totalCount"}}`
// - Success: `rspCode == "0000"`

pub mod token;

pub use token::LayoutTokenProvider;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use stockwatch_core::config::{ApiConfig, TargetConfig};
use stockwatch_core::error::FetchError;
use stockwatch_core::traits::{ExhibitionPage, ExhibitionSource, FetchOutcome, TokenProvider, Transcript};
use stockwatch_core::{Error, Result, VehicleRecord};
use tracing::{debug, warn};

/// Vendor success code
const SUCCESS_CODE: &str = "0000";

/// Raw bodies that fail to parse are kept up to this many characters
const RAW_BODY_LIMIT: usize = 500;

/// Vendor listing API client
///
/// # Trust Level: Untrusted
///
/// Single-shot and stateless: every call acquires a fresh token and reports
/// a [`FetchOutcome`]; isolation and retry policy belong to the scheduler.
pub struct ExhibitionClient {
    config: ApiConfig,
    client: reqwest::Client,
    base_headers: HeaderMap,
    tokens: Arc<dyn TokenProvider>,
}

impl ExhibitionClient {
    /// Create a client with the layout-sync token provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let base_headers = header_map(&config.headers);
        let tokens = Arc::new(LayoutTokenProvider::new(
            config.layout_sync_url.clone(),
            base_headers.clone(),
            client.clone(),
        ));

        Ok(Self {
            config,
            client,
            base_headers,
            tokens,
        })
    }

    /// Replace the token provider
    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Request URL with the cache-busting timestamp
    pub fn request_url(&self, exhb_no: &str) -> String {
        format!(
            "{}/{}?t={}",
            self.config.base_url.trim_end_matches('/'),
            exhb_no,
            Utc::now().timestamp_millis()
        )
    }

    /// Request body: defaults, then exhbNo, then target overrides, then the
    /// per-call car code
    pub fn build_payload(&self, target: &TargetConfig, car_code: Option<&str>) -> Map<String, Value> {
        let mut payload = self.config.default_payload.clone();
        payload.insert("exhbNo".to_string(), Value::String(target.exhb_no.clone()));
        target.overrides.apply(&mut payload);
        if let Some(code) = car_code {
            payload.insert("carCode".to_string(), Value::String(code.to_string()));
        }
        payload
    }

    /// Base headers overlaid with the evasion headers and the token
    pub fn build_headers(&self, exhb_no: &str, token: Option<&str>) -> HeaderMap {
        let mut headers = self.base_headers.clone();
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(reqwest::header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );

        if let Some(template) = &self.config.referer_template {
            let referer = template.replace("{exhbNo}", exhb_no);
            match HeaderValue::from_str(&referer) {
                Ok(value) => {
                    headers.insert(reqwest::header::REFERER, value);
                }
                Err(_) => warn!("Invalid Referer header value: {}", referer),
            }
        }

        if let Some(token) = token {
            match (
                HeaderName::from_bytes(self.config.token_header.as_bytes()),
                HeaderValue::from_str(token),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Token header could not be encoded, sending without it"),
            }
        }

        headers
    }

    async fn fetch_inner(
        &self,
        target: &TargetConfig,
        car_code: Option<&str>,
        transcript: &mut Transcript,
    ) -> std::result::Result<ExhibitionPage, FetchError> {
        let url = self.request_url(&target.exhb_no);
        let payload = self.build_payload(target, car_code);
        let token = self.tokens.acquire().await;
        let headers = self.build_headers(&target.exhb_no, token.as_deref());

        transcript.push(format!(">>> REQUEST: {}", url));
        transcript.push(format!(
            "PAYLOAD: {}",
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        ));
        transcript.push(format!(
            "TOKEN: {}",
            if token.is_some() { "present" } else { "absent" }
        ));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "timeout".to_string()
                } else {
                    e.to_string()
                };
                transcript.push(format!("ERROR: {}", reason));
                FetchError::Transport(reason)
            })?;

        let status = response.status().as_u16();
        transcript.push(format!("<<< RESPONSE Status: {}", status));

        let text = response.text().await.map_err(|e| {
            transcript.push(format!("ERROR: {}", e));
            FetchError::Transport(e.to_string())
        })?;

        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(e) => {
                let raw: String = text.chars().take(RAW_BODY_LIMIT).collect();
                transcript.push(format!("BODY: (Raw) {}", raw));
                return Err(FetchError::Parse(e.to_string()));
            }
        };
        transcript.push(format!(
            "BODY: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        ));

        if status != 200 {
            return Err(FetchError::Http { status });
        }

        parse_response(&body)
    }
}

#[async_trait]
impl ExhibitionSource for ExhibitionClient {
    async fn fetch(&self, target: &TargetConfig, car_code: Option<&str>) -> FetchOutcome {
        let mut transcript = Transcript::new();
        let result = self.fetch_inner(target, car_code, &mut transcript).await;

        match &result {
            Ok(page) => debug!(
                "[{}] code {}: {} vehicle(s), total {}",
                target.label,
                car_code.unwrap_or("*"),
                page.vehicles.len(),
                page.total
            ),
            Err(e) => debug!(
                "[{}] code {} failed: {}",
                target.label,
                car_code.unwrap_or("*"),
                e
            ),
        }
        tracing::trace!("[{}] transcript:\n{}", target.label, transcript);

        FetchOutcome { result, transcript }
    }

    fn source_name(&self) -> &'static str {
        "vendor-http"
    }
}

/// Interpret a parsed listing response
///
/// # Returns
///
/// - `Ok(page)`: Success code with a list payload (possibly empty)
/// - `Err(FetchError::Application)`: Vendor-reported failure
/// - `Err(FetchError::EvasionDetected)`: Success code with no usable data
pub fn parse_response(body: &Value) -> std::result::Result<ExhibitionPage, FetchError> {
    let rsp = body.get("rspStatus");
    let code = rsp.and_then(|r| r.get("rspCode")).map(scalar_text);

    if code.as_deref() != Some(SUCCESS_CODE) {
        let message = rsp
            .and_then(|r| r.get("rspMessage"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("unknown error")
            .to_string();
        return Err(FetchError::Application {
            code: code.unwrap_or_else(|| "-".to_string()),
            message,
        });
    }

    let data = match body.get("data") {
        Some(Value::Object(data)) if !data.is_empty() => data,
        _ => return Err(FetchError::EvasionDetected),
    };

    let list = ["list", "discountsearchcars"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array))
        .ok_or(FetchError::EvasionDetected)?;

    let vehicles: Vec<VehicleRecord> = list
        .iter()
        .cloned()
        .filter_map(VehicleRecord::from_value)
        .collect();

    let total = data
        .get("totalCount")
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(vehicles.len() as u64);

    Ok(ExhibitionPage { vehicles, total })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn header_map(headers: &std::collections::BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!("Skipping invalid header: {}", name),
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockwatch_core::config::PayloadOverrides;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken(Option<&'static str>);

    #[async_trait]
    impl TokenProvider for StaticToken {
        async fn acquire(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn client_for(server: &MockServer, token: Option<&'static str>) -> ExhibitionClient {
        let mut config = ApiConfig::new(format!("{}/exhibition", server.uri()));
        config.referer_template = Some("https://shop.example/promotion?exhbNo={exhbNo}".into());
        config.default_payload = json!({"pageNo": 1, "carCode": "DEFAULT"})
            .as_object()
            .cloned()
            .unwrap();
        ExhibitionClient::new(config)
            .unwrap()
            .with_token_provider(Arc::new(StaticToken(token)))
    }

    fn success(list: Value) -> Value {
        json!({
            "rspStatus": {"rspCode": "0000", "rspMessage": "OK"},
            "data": {"list": list, "totalCount": 7}
        })
    }

    #[test]
    fn test_parse_response_success() {
        let page = parse_response(&success(json!([{"vehicleId": "V1"}, {"vehicleId": "V2"}]))).unwrap();
        assert_eq!(page.vehicles.len(), 2);
        assert_eq!(page.total, 7);
    }

    #[test]
    fn test_parse_response_discount_list_and_default_total() {
        let body = json!({
            "rspStatus": {"rspCode": "0000"},
            "data": {"discountsearchcars": [{"vin": "K1"}]}
        });
        let page = parse_response(&body).unwrap();
        assert_eq!(page.vehicles.len(), 1);
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_parse_response_empty_list_is_success() {
        let page = parse_response(&success(json!([]))).unwrap();
        assert!(page.vehicles.is_empty());
    }

    #[test]
    fn test_parse_response_application_error() {
        let body = json!({"rspStatus": {"rspCode": "E001", "rspMessage": "blocked"}});
        assert_eq!(
            parse_response(&body),
            Err(FetchError::Application {
                code: "E001".into(),
                message: "blocked".into()
            })
        );

        assert_eq!(
            parse_response(&json!({"data": {"list": []}})),
            Err(FetchError::Application {
                code: "-".into(),
                message: "unknown error".into()
            })
        );
    }

    #[test]
    fn test_parse_response_spoofed_success() {
        let ok = json!({"rspCode": "0000"});
        for body in [
            json!({"rspStatus": ok}),
            json!({"rspStatus": ok, "data": null}),
            json!({"rspStatus": ok, "data": {}}),
            json!({"rspStatus": ok, "data": "none"}),
            json!({"rspStatus": ok, "data": {"totalCount": 0}}),
        ] {
            assert_eq!(parse_response(&body), Err(FetchError::EvasionDetected), "{}", body);
        }
    }

    #[test]
    fn test_build_payload_override_order() {
        let server_uri = "http://vendor.invalid";
        let mut config = ApiConfig::new(format!("{}/exhibition", server_uri));
        config.default_payload = json!({"pageNo": 1, "carCode": "DEFAULT", "subsidyRegion": "1100"})
            .as_object()
            .cloned()
            .unwrap();
        let client = ExhibitionClient::new(config).unwrap();

        let target = TargetConfig::new("E1", "기획전", 1).with_overrides(PayloadOverrides {
            car_code: Some("TARGET".into()),
            delivery_area_code: Some("B".into()),
            ..Default::default()
        });

        let payload = client.build_payload(&target, Some("AX05"));
        assert_eq!(payload["exhbNo"], "E1");
        assert_eq!(payload["carCode"], "AX05");
        assert_eq!(payload["deliveryAreaCode"], "B");
        assert_eq!(payload["subsidyRegion"], "1100");
        assert_eq!(payload["pageNo"], 1);
        assert!(!payload.contains_key("deliveryCenterCode"));

        let without_code = client.build_payload(&target, None);
        assert_eq!(without_code["carCode"], "TARGET");
    }

    #[tokio::test]
    async fn test_fetch_sends_evasion_headers_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exhibition/E1"))
            .and(header("cache-control", "no-cache"))
            .and(header("pragma", "no-cache"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(header("referer", "https://shop.example/promotion?exhbNo=E1"))
            .and(header("x-layout-hash", "tok"))
            .and(body_partial_json(json!({"exhbNo": "E1", "carCode": "AX05", "pageNo": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(success(json!([{"vehicleId": "V1"}]))))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("tok"));
        let outcome = client.fetch(&TargetConfig::new("E1", "기획전", 1), Some("AX05")).await;

        let page = outcome.result.unwrap();
        assert_eq!(page.vehicles[0].id().as_deref(), Some("V1"));
        assert!(outcome.transcript.lines()[0].starts_with(">>> REQUEST: "));
        assert!(outcome.transcript.lines()[0].contains("/exhibition/E1?t="));
        assert!(outcome.transcript.to_string().contains("TOKEN: present"));
    }

    #[tokio::test]
    async fn test_fetch_without_token_omits_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exhibition/E1"))
            .and(header_exists("x-layout-hash"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/exhibition/E1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success(json!([]))))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let outcome = client.fetch(&TargetConfig::new("E1", "기획전", 1), None).await;

        assert!(outcome.result.is_ok());
        assert!(outcome.transcript.to_string().contains("TOKEN: absent"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_keeps_body_in_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "forbidden"})))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let outcome = client.fetch(&TargetConfig::new("E1", "기획전", 1), None).await;

        assert_eq!(outcome.result, Err(FetchError::Http { status: 403 }));
        let transcript = outcome.transcript.to_string();
        assert!(transcript.contains("<<< RESPONSE Status: 403"));
        assert!(transcript.contains("forbidden"));
    }

    #[tokio::test]
    async fn test_fetch_non_json_body_is_parse_error() {
        let server = MockServer::start().await;
        let html = format!("<html>{}</html>", "x".repeat(1000));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let outcome = client.fetch(&TargetConfig::new("E1", "기획전", 1), None).await;

        assert!(matches!(outcome.result, Err(FetchError::Parse(_))));
        let raw_line = outcome
            .transcript
            .lines()
            .iter()
            .find(|l| l.starts_with("BODY: (Raw) "))
            .cloned()
            .unwrap();
        assert_eq!(raw_line.len(), "BODY: (Raw) ".len() + RAW_BODY_LIMIT);
    }

    #[tokio::test]
    async fn test_fetch_spoofed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"rspStatus": {"rspCode": "0000"}, "data": {}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let outcome = client.fetch(&TargetConfig::new("E1", "기획전", 1), None).await;
        assert_eq!(outcome.result, Err(FetchError::EvasionDetected));
    }

    #[tokio::test]
    async fn test_fetch_connection_failure_is_transport_error() {
        let mut config = ApiConfig::new("http://127.0.0.1:9/exhibition");
        config.timeout_secs = 2;
        let client = ExhibitionClient::new(config)
            .unwrap()
            .with_token_provider(Arc::new(StaticToken(None)));

        let outcome = client.fetch(&TargetConfig::new("E1", "기획전", 1), None).await;
        assert!(matches!(outcome.result, Err(FetchError::Transport(_))));
        assert!(outcome.transcript.to_string().contains("ERROR: "));
    }
}
