//! Streaming chat-completion client for OpenAI-compatible endpoints.

pub mod sse;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use lenny_core::config::GenerationSettings;
use lenny_core::traits::{CompletionBackend, FragmentStream};
use lenny_core::types::CompletionRequest;

pub use sse::{decode_fragments, parse_sse_line, LineBuffer, SseEvent};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

pub struct ChatCompletionClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionClient {
    pub fn new(base_url: &str, model: &str, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    /// Reads the API key from the environment variable named in `settings`.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| anyhow!("{} is not set; it must hold the completion API key", settings.api_key_env))?;
        Ok(Self::new(&settings.base_url, &settings.model, api_key))
    }

    pub fn model(&self) -> &str { &self.model }
}

fn prompt_chars(prompt: &str) -> usize { prompt.chars().count() }

#[async_trait]
impl CompletionBackend for ChatCompletionClient {
    async fn generate(&self, request: CompletionRequest) -> Result<FragmentStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, prompt_chars = prompt_chars(&request.prompt), "opening completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("connecting to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("completion endpoint returned {}: {}", status, detail));
        }
        info!(model = %self.model, "completion stream open");
        Ok(Box::pin(decode_fragments(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_size_counts_characters_not_bytes() {
        assert_eq!(prompt_chars("café ’quote’"), 12);
        assert_eq!(prompt_chars(""), 0);
    }
}
