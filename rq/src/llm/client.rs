//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// Any conversational memory is carried explicitly in the request's
/// messages; the client keeps nothing between calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// One scripted outcome for [`MockLlmClient`]
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Reply(CompletionResponse),
        Fail { status: u16, message: String },
    }

    impl Scripted {
        pub fn reply(text: &str) -> Self {
            Scripted::Reply(CompletionResponse::text(text))
        }

        pub fn fail(status: u16, message: &str) -> Self {
            Scripted::Fail {
                status,
                message: message.to_string(),
            }
        }
    }

    /// Mock LLM client for unit tests
    ///
    /// Plays back scripted outcomes in order and records every request. When
    /// the script runs out it echoes the last user message prefixed with
    /// `rewritten: `.
    pub struct MockLlmClient {
        script: Vec<Scripted>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(script: Vec<Scripted>) -> Self {
            debug!(script_len = %script.len(), "MockLlmClient::new: called");
            Self {
                script,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockLlmClient::complete: called");
            let last_user = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }

            match self.script.get(idx) {
                Some(Scripted::Reply(response)) => Ok(response.clone()),
                Some(Scripted::Fail { status, message }) => Err(LlmError::ApiError {
                    status: *status,
                    message: message.clone(),
                }),
                None => Ok(CompletionResponse::text(format!("rewritten: {}", last_user))),
            }
        }
    }

    mod tests {
        use super::*;
        use crate::llm::Message;

        fn request(text: &str) -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![Message::user(text)],
                max_tokens: 1000,
            }
        }

        #[tokio::test]
        async fn test_mock_client_plays_script_then_echoes() {
            let client = MockLlmClient::new(vec![Scripted::reply("first"), Scripted::fail(500, "boom")]);

            let resp = client.complete(request("a")).await.unwrap();
            assert_eq!(resp.content.as_deref(), Some("first"));

            let err = client.complete(request("b")).await.unwrap_err();
            assert!(err.to_string().contains("boom"));

            let resp = client.complete(request("c")).await.unwrap();
            assert_eq!(resp.content.as_deref(), Some("rewritten: c"));

            assert_eq!(client.call_count(), 3);
            assert_eq!(client.requests().len(), 3);
        }
    }
}
