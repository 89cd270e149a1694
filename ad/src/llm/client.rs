//! LlmClient trait definition

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, LlmError};

/// Stateless chat client - each call is independent
///
/// The scheduler never relies on conversation state between calls; every
/// reflection and planning request carries its full context. Streaming
/// is an implementation detail a client may use internally - the trait
/// surface is request/response.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one chat request and wait for the complete response
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    use crate::llm::ChatOutput;

    /// Scripted response or error for the mock
    pub enum MockReply {
        Ok(ChatResponse),
        Err(fn() -> LlmError),
    }

    /// Mock LLM client for unit tests - replays a script of responses
    pub struct MockLlmClient {
        replies: Mutex<Vec<MockReply>>,
        call_count: AtomicUsize,
        /// Reply returned when the script runs out, if set
        fallback: Option<ChatResponse>,
    }

    impl MockLlmClient {
        /// Create a mock that replays the given responses in order
        pub fn new(responses: Vec<ChatResponse>) -> Self {
            debug!(response_count = responses.len(), "MockLlmClient::new: called");
            Self {
                replies: Mutex::new(responses.into_iter().map(MockReply::Ok).collect()),
                call_count: AtomicUsize::new(0),
                fallback: None,
            }
        }

        /// Create a mock from a script of replies (responses and errors)
        pub fn from_script(replies: Vec<MockReply>) -> Self {
            debug!(reply_count = replies.len(), "MockLlmClient::from_script: called");
            Self {
                replies: Mutex::new(replies),
                call_count: AtomicUsize::new(0),
                fallback: None,
            }
        }

        /// Builder: reply with this response once the script is exhausted
        pub fn with_fallback(mut self, response: ChatResponse) -> Self {
            self.fallback = Some(response);
            self
        }

        /// Number of chat calls made
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(idx, "MockLlmClient::chat: called");
            let mut replies = self.replies.lock().expect("mock lock poisoned");
            if replies.is_empty() {
                if let Some(fallback) = &self.fallback {
                    debug!("MockLlmClient::chat: script exhausted, using fallback");
                    return Ok(clone_response(fallback));
                }
                debug!("MockLlmClient::chat: no more scripted replies");
                return Err(LlmError::InvalidResponse("No more mock responses".to_string()));
            }
            match replies.remove(0) {
                MockReply::Ok(response) => Ok(response),
                MockReply::Err(make) => Err(make()),
            }
        }
    }

    fn clone_response(response: &ChatResponse) -> ChatResponse {
        let output = match &response.output {
            ChatOutput::Text(text) => ChatOutput::Text(text.clone()),
            ChatOutput::Json(value) => ChatOutput::Json(value.clone()),
            ChatOutput::FunctionCall { name, arguments } => ChatOutput::FunctionCall {
                name: name.clone(),
                arguments: arguments.clone(),
            },
        };
        ChatResponse {
            output,
            usage: response.usage,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::llm::Message;

        #[tokio::test]
        async fn test_mock_replays_in_order() {
            let client = MockLlmClient::new(vec![ChatResponse::text("first"), ChatResponse::text("second")]);
            let request = ChatRequest::new("test").with_message(Message::user("hi"));

            let first = client.chat(request.clone()).await.unwrap();
            assert_eq!(first.output.as_text(), Some("first"));
            let second = client.chat(request).await.unwrap();
            assert_eq!(second.output.as_text(), Some("second"));
            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            let request = ChatRequest::new("test");
            assert!(client.chat(request).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_fallback_after_script() {
            let client = MockLlmClient::new(vec![]).with_fallback(ChatResponse::text("always"));
            let request = ChatRequest::new("test");
            let response = client.chat(request).await.unwrap();
            assert_eq!(response.output.as_text(), Some("always"));
        }
    }
}
