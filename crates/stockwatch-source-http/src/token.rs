// # Layout Token Provider
//
// Acquires the anti-automation token from the vendor's layout-sync endpoint.
//
// ## Contract
//
// - One fresh GET per acquisition; tokens are never cached
// - Any failure yields `None` and the request proceeds without the header
// - Never fatal, never retried

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use stockwatch_core::traits::TokenProvider;
use tracing::{debug, warn};

/// Token provider backed by the layout-sync endpoint
///
/// Expects `{"data": {"layoutHash": "<token>"}}` with HTTP 200.
#[derive(Debug, Clone)]
pub struct LayoutTokenProvider {
    url: Option<String>,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl LayoutTokenProvider {
    /// Create a provider
    ///
    /// # Parameters
    ///
    /// - `url`: Layout-sync endpoint; `None` disables token acquisition
    /// - `headers`: Baseline headers sent with the sync request
    /// - `client`: Shared HTTP client (carries the request timeout)
    pub fn new(url: Option<String>, headers: HeaderMap, client: reqwest::Client) -> Self {
        Self {
            url,
            headers,
            client,
        }
    }

    async fn fetch_token(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("malformed body: {}", e))?;

        extract_layout_hash(&body).ok_or_else(|| "layoutHash missing".to_string())
    }
}

#[async_trait]
impl TokenProvider for LayoutTokenProvider {
    async fn acquire(&self) -> Option<String> {
        let url = self.url.as_deref()?;

        match self.fetch_token(url).await {
            Ok(token) => {
                debug!("Layout token acquired");
                Some(token)
            }
            Err(reason) => {
                warn!("Layout token unavailable ({}), continuing without it", reason);
                None
            }
        }
    }
}

/// Read `data.layoutHash` as a non-empty string
pub fn extract_layout_hash(body: &Value) -> Option<String> {
    body.get("data")?
        .get("layoutHash")?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_layout_hash() {
        assert_eq!(
            extract_layout_hash(&json!({"data": {"layoutHash": "abc"}})).as_deref(),
            Some("abc")
        );
        assert_eq!(extract_layout_hash(&json!({"data": {"layoutHash": ""}})), None);
        assert_eq!(extract_layout_hash(&json!({"data": {"layoutHash": 5}})), None);
        assert_eq!(extract_layout_hash(&json!({"data": null})), None);
        assert_eq!(extract_layout_hash(&json!([])), None);
    }

    #[tokio::test]
    async fn test_acquire_fresh_token_every_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/layout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"layoutHash": "h1"}})))
            .expect(2)
            .mount(&server)
            .await;

        let provider = LayoutTokenProvider::new(
            Some(format!("{}/layout", server.uri())),
            HeaderMap::new(),
            reqwest::Client::new(),
        );

        assert_eq!(provider.acquire().await.as_deref(), Some("h1"));
        assert_eq!(provider.acquire().await.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn test_acquire_failures_yield_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        for endpoint in ["down", "garbage"] {
            let provider = LayoutTokenProvider::new(
                Some(format!("{}/{}", server.uri(), endpoint)),
                HeaderMap::new(),
                client.clone(),
            );
            assert_eq!(provider.acquire().await, None, "endpoint {}", endpoint);
        }

        let disabled = LayoutTokenProvider::new(None, HeaderMap::new(), client);
        assert_eq!(disabled.acquire().await, None);
    }
}
