//! OpenAI chat completions adapter. Works for any OpenAI-compatible endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ProviderAdapter, ProviderError};
use crate::transport::{AuthStyle, HttpTransport};
use crate::types::{GenerationParams, Prompt};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const CHAT_PATH: &str = "/v1/chat/completions";

#[derive(Debug)]
pub struct OpenAiAdapter {
    name: String,
    model: String,
    transport: HttpTransport,
}

impl OpenAiAdapter {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let transport =
            HttpTransport::new(name.clone(), base_url, api_key, AuthStyle::Bearer, timeout)?;
        Ok(Self {
            name,
            model: model.into(),
            transport,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, prompt: &Prompt, params: &GenerationParams) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt.user }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
        });
        for (k, v) in &params.options {
            body[k.as_str()] = v.clone();
        }
        body
    }

    fn parse_reply(&self, body: &Value) -> Result<String, ProviderError> {
        if body.pointer("/choices/0/finish_reason").and_then(|v| v.as_str())
            == Some("content_filter")
        {
            return Err(ProviderError::invalid(
                self.name.clone(),
                "completion blocked by content filter",
            ));
        }
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::invalid(self.name.clone(), "empty completion"));
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let body = self.build_body(prompt, params);
        let reply = self.transport.post_json(CHAT_PATH, &body).await?;
        self.parse_reply(&reply)
    }

    fn identify(&self) -> &str {
        &self.name
    }
}
