//! OpenAI-compatible chat-completions client over reqwest, with SSE
//! streaming support.

use super::{ChatCompletions, ChatMessage, SamplingParams, StreamEvent};
use crate::{Result, RewriteError};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// Generous enough for slow reasoning models; per-call timeouts beyond this
// are the caller's concern.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &params.model,
            messages,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            stream,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        debug!("Sending chat completion request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RewriteError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatCompletions for OpenAiCompatClient {
    async fn chat(&self, messages: Vec<ChatMessage>, params: &SamplingParams) -> Result<String> {
        let response = self.send(&messages, params, false).await?;
        let parsed: ChatResponse = response.json().await?;

        // A missing/empty content field surfaces as an empty response, which
        // the orchestration loop treats as transient.
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(content)
    }

    async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<String> {
        let response = self.send(&messages, params, true).await?;
        let mut byte_stream = response.bytes_stream();

        let mut buffer: Vec<u8> = Vec::new();
        let mut content = String::new();
        let mut done = false;

        while let Some(chunk) = byte_stream.next().await {
            let bytes =
                chunk.map_err(|e| RewriteError::Stream(format!("stream read failed: {}", e)))?;
            buffer.extend_from_slice(&bytes);

            // Process complete SSE events; events end at a blank line, so a
            // UTF-8 sequence split across network chunks stays in the buffer.
            while let Some(pos) = find_event_boundary(&buffer) {
                let event = std::str::from_utf8(&buffer[..pos])
                    .map_err(|e| RewriteError::Stream(format!("invalid UTF-8 in stream: {}", e)))?
                    .to_string();
                buffer.drain(..pos + 2);

                for line in event.lines() {
                    let line = line.trim_end_matches('\r');
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim_start();

                    if data == "[DONE]" {
                        done = true;
                        break;
                    }

                    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
                        RewriteError::Stream(format!("failed to parse stream chunk: {}", e))
                    })?;

                    if let Some(choice) = chunk.choices.into_iter().next() {
                        if let Some(text) = choice.delta.reasoning_content {
                            if !text.is_empty() {
                                on_event(StreamEvent::Reasoning(text));
                            }
                        }
                        if let Some(text) = choice.delta.content {
                            if !text.is_empty() {
                                content.push_str(&text);
                                on_event(StreamEvent::Content(text));
                            }
                        }
                    }
                }

                if done {
                    break;
                }
            }

            if done {
                break;
            }
        }

        Ok(content)
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}
