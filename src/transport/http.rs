use crate::provider::ProviderError;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::debug;

/// How the API key travels with each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` (OpenAI-compatible APIs).
    Bearer,
    /// `?<param>=<key>` query parameter (Gemini).
    QueryParam(&'static str),
}

/// Pooled JSON-over-HTTP client for one provider.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    provider: String,
    api_key: Option<String>,
    auth: AuthStyle,
}

impl HttpTransport {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        auth: AuthStyle,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let provider = provider.into();

        // Minimal production-friendly defaults (env-overridable).
        let builder = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(
                env::var("AI_RELAY_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("AI_RELAY_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        let client = builder
            .build()
            .map_err(|e| ProviderError::invalid(provider.clone(), e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            provider,
            api_key,
            auth,
        })
    }

    /// POST a JSON body and return the decoded JSON reply.
    ///
    /// Non-success statuses are classified into a `ProviderError` using the status code
    /// and any provider error code found in the body.
    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Value, ProviderError> {
        let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(ProviderError::invalid(
                self.provider.clone(),
                "missing API credentials",
            ));
        };

        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);
        req = match self.auth {
            AuthStyle::Bearer => req.bearer_auth(key),
            AuthStyle::QueryParam(param) => req.query(&[(param, key)]),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.provider.clone(), &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let code = error_code_from_body(&text);
            debug!(
                provider = self.provider.as_str(),
                http_status = status.as_u16(),
                provider_code = code.as_deref().unwrap_or(""),
                "provider returned error status"
            );
            return Err(ProviderError::from_http(
                self.provider.clone(),
                status.as_u16(),
                code,
                &text,
            ));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.provider.clone(), &e))
    }
}

/// Extract a provider error code from the common error shapes:
/// OpenAI `{"error": {"code": ..., "type": ...}}` and Gemini `{"error": {"status": ...}}`.
fn error_code_from_body(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    ["code", "status", "type"]
        .iter()
        .find_map(|field| error.get(*field).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}
