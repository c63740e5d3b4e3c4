use std::time::{Duration, Instant};

use async_trait::async_trait;
use codeburn_core::{CodeBurnError, ModelSpec, Prompt, RawResponse, Result};
use serde::Serialize;

/// Obtains a model's raw answer to a prompt. Transport problems are
/// reported on the response, never as an error.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, model: &ModelSpec, prompt: &Prompt) -> RawResponse;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat-completion client for Ollama-style endpoints.
#[derive(Debug, Clone)]
pub struct ModelClient {
    client: reqwest::Client,
}

impl ModelClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CodeBurnError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, model: &ModelSpec, prompt: &Prompt) -> std::result::Result<String, String> {
        let request = ChatRequest {
            model: &model.model_name,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt.prompt_text,
            }],
            stream: false,
            think: model.supports_think.then_some(true),
        };

        let mut builder = self.client.post(&model.url).json(&request);
        if let Some((header, value)) = model.auth() {
            builder = builder.header(header, value);
        }

        let resp = builder.send().await.map_err(describe)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                "HTTP {} from {}: {}",
                status,
                model.model_name,
                body.chars().take(500).collect::<String>()
            );
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = resp.text().await.map_err(describe)?;
        Ok(response_content(&body))
    }
}

#[async_trait]
impl Dispatcher for ModelClient {
    async fn dispatch(&self, model: &ModelSpec, prompt: &Prompt) -> RawResponse {
        tracing::info!(
            "Querying {} with prompt '{}'",
            model.model_name,
            prompt.name
        );

        let start = Instant::now();
        let result = self.send(model, prompt).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(text) => RawResponse::ok(&model.model_name, &prompt.name, text, elapsed),
            Err(e) => {
                tracing::warn!("Request to {} failed: {}", model.model_name, e);
                RawResponse::failed(&model.model_name, &prompt.name, e, elapsed)
            }
        }
    }
}

fn describe(e: reqwest::Error) -> String {
    match e.is_timeout() {
        true => "request timeout".to_string(),
        false => format!("request failed: {}", e),
    }
}

/// `message.content` (chat API), else `response` (generate API), else the
/// body verbatim.
fn response_content(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    json.pointer("/message/content")
        .and_then(|v| v.as_str())
        .or_else(|| json.get("response").and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}
