//! The LLM client (spec §4.6 chat generation, §4.7 re-summary).

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent};
use genai::Client;
use slab_types::RuntimeError;
use tracing::warn;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A single non-streaming completion, used by the re-summary task.
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, RuntimeError>;

    /// A token stream, used by the chat orchestrator's producer (spec §4.6).
    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, RuntimeError>>, RuntimeError>;
}

/// [`LlmClient`] backed by the `genai` crate, talking to whichever provider
/// the configured model name resolves to.
pub struct GenaiLlmClient {
    client: Client,
    model: String,
}

impl GenaiLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self { client: Client::default(), model: model.into() }
    }

    fn request(system: Option<&str>, prompt: &str) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        ChatRequest::new(messages)
    }
}

#[async_trait]
impl LlmClient for GenaiLlmClient {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, RuntimeError> {
        let response = self
            .client
            .exec_chat(&self.model, Self::request(system, prompt), None)
            .await
            .map_err(|e| RuntimeError::LlmFailure(e.to_string()))?;
        response
            .content_text_as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RuntimeError::LlmFailure("empty response".to_string()))
    }

    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, RuntimeError>>, RuntimeError> {
        let stream_response = self
            .client
            .exec_chat_stream(&self.model, Self::request(system, prompt), None)
            .await
            .map_err(|e| RuntimeError::LlmFailure(e.to_string()))?;

        let tokens = stream_response.stream.filter_map(|event| async move {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => Some(Ok(chunk.content)),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "llm stream event error");
                    Some(Err(RuntimeError::LlmFailure(e.to_string())))
                }
            }
        });
        Ok(Box::pin(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClient {
        tokens: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmClient for FakeClient {
        async fn complete(&self, _system: Option<&str>, _prompt: &str) -> Result<String, RuntimeError> {
            Ok(self.tokens.concat())
        }

        async fn stream(
            &self,
            _system: Option<&str>,
            _prompt: &str,
        ) -> Result<BoxStream<'static, Result<String, RuntimeError>>, RuntimeError> {
            let items: Vec<Result<String, RuntimeError>> =
                self.tokens.iter().map(|t| Ok(t.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn fake_client_completes() {
        let client = FakeClient { tokens: vec!["hel", "lo"] };
        let out = client.complete(None, "hi").await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn fake_client_streams_in_order() {
        let client = FakeClient { tokens: vec!["a", "b", "c"] };
        let mut stream = client.stream(None, "hi").await.unwrap();
        let mut collected = Vec::new();
        while let Some(tok) = stream.next().await {
            collected.push(tok.unwrap());
        }
        assert_eq!(collected, vec!["a", "b", "c"]);
    }
}
