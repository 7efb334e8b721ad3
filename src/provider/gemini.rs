//! Google Gemini generateContent adapter.
//!
//! - System text goes into `system_instruction`, user text into `contents[0].parts`.
//! - `temperature` / `maxOutputTokens` and extra options live under `generationConfig`.
//! - The API key is passed as the `key` query parameter.
//! - A reply with `promptFeedback.blockReason` or no text parts is unusable.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ProviderAdapter, ProviderError};
use crate::transport::{AuthStyle, HttpTransport};
use crate::types::{GenerationParams, Prompt};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug)]
pub struct GeminiAdapter {
    name: String,
    model: String,
    transport: HttpTransport,
}

impl GeminiAdapter {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let transport = HttpTransport::new(
            name.clone(),
            base_url,
            api_key,
            AuthStyle::QueryParam("key"),
            timeout,
        )?;
        Ok(Self {
            name,
            model: model.into(),
            transport,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn path(&self) -> String {
        format!("/v1beta/models/{}:generateContent", self.model)
    }

    fn build_body(&self, prompt: &Prompt, params: &GenerationParams) -> Value {
        let mut generation_config = json!({
            "temperature": params.temperature,
            "maxOutputTokens": params.max_output_tokens,
        });
        for (k, v) in &params.options {
            generation_config[k.as_str()] = v.clone();
        }

        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt.user }],
            }],
            "generationConfig": generation_config,
        });
        if let Some(system) = &prompt.system {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    fn parse_reply(&self, body: &Value) -> Result<String, ProviderError> {
        if let Some(reason) = body
            .pointer("/promptFeedback/blockReason")
            .and_then(|v| v.as_str())
        {
            return Err(ProviderError::invalid(
                self.name.clone(),
                format!("prompt blocked: {}", reason),
            ));
        }

        let text: String = body
            .pointer("/candidates/0/content/parts")
            .and_then(|v| v.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            let finish = body
                .pointer("/candidates/0/finishReason")
                .and_then(|v| v.as_str())
                .unwrap_or("none");
            return Err(ProviderError::invalid(
                self.name.clone(),
                format!("empty candidate (finishReason: {})", finish),
            ));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let body = self.build_body(prompt, params);
        let reply = self.transport.post_json(&self.path(), &body).await?;
        self.parse_reply(&reply)
    }

    fn identify(&self) -> &str {
        &self.name
    }
}
