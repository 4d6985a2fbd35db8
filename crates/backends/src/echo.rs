//! Echo backend: answers with the last user message.
//!
//! Lets the gateway, queue, and session plumbing run end to end without a
//! model server.

use async_trait::async_trait;
use turnstile_core::backend::{Backend, GenerationRequest};
use turnstile_core::error::BackendError;
use turnstile_core::message::Role;

#[derive(Debug, Default)]
pub struct EchoBackend;

#[async_trait]
impl Backend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(format!("You said: {last_user}"))
    }
}
