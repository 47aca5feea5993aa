//! Chat-completion driver: client trait, the OpenAI-compatible HTTP
//! implementation and the streaming display layer.

pub mod client;
pub mod stream;

pub use client::OpenAiCompatClient;
pub use stream::StreamPrinter;

use crate::config::StreamStyle;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// Chat message for the completions API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion request
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One delta received on a streaming completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Intermediate reasoning text (reasoning-capable models only)
    Reasoning(String),
    /// A piece of the final content payload
    Content(String),
}

/// Trait for chat-completion backends
#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Single blocking request/response cycle; returns the full content.
    async fn chat(&self, messages: Vec<ChatMessage>, params: &SamplingParams) -> Result<String>;

    /// Streaming request; every delta is handed to `on_event` as it arrives
    /// and the accumulated content is returned at the end.
    async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<String>;
}

/// Display/transcript settings for a streamed completion
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub enabled: bool,
    pub style: StreamStyle,
    pub show_reasoning: bool,
    pub transcript: Option<PathBuf>,
}

/// Obtain the raw completion text for one batch.
///
/// When streaming is enabled, partial output is rendered incrementally
/// through a [`StreamPrinter`] instead of buffering until completion; the
/// transcript sink (if configured) receives every displayed chunk verbatim.
pub async fn drive_completion(
    client: &dyn ChatCompletions,
    system_prompt: &str,
    user_prompt: &str,
    params: &SamplingParams,
    opts: &StreamOptions,
) -> Result<String> {
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_prompt),
    ];

    if !opts.enabled {
        return client.chat(messages, params).await;
    }

    println!("\n===== streaming started =====");
    if opts.show_reasoning && params.model.contains("reasoner") {
        println!("----- reasoning (live) -----");
    } else {
        println!("----- content (live) -----");
    }

    let mut printer = StreamPrinter::new(opts.style, opts.transcript.as_deref())?;
    let content = client
        .chat_stream(messages, params, &mut |event| match event {
            StreamEvent::Reasoning(text) => {
                if opts.show_reasoning {
                    printer.add(&text);
                }
            }
            StreamEvent::Content(text) => printer.add(&text),
        })
        .await?;
    printer.finish()?;

    println!("\n===== streaming done =====\n");
    Ok(content)
}

/// Mock chat client for testing: pops canned responses in order.
pub struct MockChatClient {
    responses: Mutex<VecDeque<String>>,
}

impl MockChatClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    fn next_response(&self) -> String {
        self.responses
            .lock()
            .expect("mock response queue poisoned")
            .pop_front()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompletions for MockChatClient {
    async fn chat(&self, _messages: Vec<ChatMessage>, _params: &SamplingParams) -> Result<String> {
        Ok(self.next_response())
    }

    async fn chat_stream(
        &self,
        _messages: Vec<ChatMessage>,
        _params: &SamplingParams,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<String> {
        let text = self.next_response();
        if !text.is_empty() {
            on_event(StreamEvent::Content(text.clone()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let system = ChatMessage::system("rules");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "rules");

        let user = ChatMessage::user("hello");
        assert_eq!(user.role, "user");
    }

    #[tokio::test]
    async fn test_mock_client_pops_in_order() {
        let mock = MockChatClient::new(vec!["one".to_string(), "two".to_string()]);
        let params = SamplingParams {
            model: "test".to_string(),
            max_tokens: 16,
            temperature: 0.0,
        };

        assert_eq!(mock.chat(vec![], &params).await.unwrap(), "one");
        assert_eq!(mock.chat(vec![], &params).await.unwrap(), "two");
        // Exhausted queue yields an empty (transient) response.
        assert_eq!(mock.chat(vec![], &params).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_mock_client_streams_content() {
        let mock = MockChatClient::new(vec!["payload".to_string()]);
        let params = SamplingParams {
            model: "test".to_string(),
            max_tokens: 16,
            temperature: 0.0,
        };

        let mut events = Vec::new();
        let content = mock
            .chat_stream(vec![], &params, &mut |event| events.push(event))
            .await
            .unwrap();

        assert_eq!(content, "payload");
        assert_eq!(events, vec![StreamEvent::Content("payload".to_string())]);
    }
}
