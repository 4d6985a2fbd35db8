//! Backend trait — the abstraction over the text-generation engine.
//!
//! The conversation loop treats a backend as an opaque function: prompt-shaped
//! messages in, raw text out. Tool calling happens in-band through the text
//! protocol, so backends never see tool definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::Message;

/// One generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name (for logs and health output).
    fn name(&self) -> &str;

    /// Generate a completion for the given messages.
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError>;
}

/// A synchronous generation engine, such as an in-process model.
///
/// Wrap one in a blocking adapter to use it as a [`Backend`].
pub trait Generator: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;
}
