//! Adapter that runs a synchronous [`Generator`] on the blocking pool.
//!
//! In-process inference is CPU/accelerator-bound. Calling it directly from an
//! async handler would stall every other connection served by that worker
//! thread, so each call is shipped to `spawn_blocking` and awaited.

use std::sync::Arc;

use async_trait::async_trait;
use turnstile_core::backend::{Backend, GenerationRequest, Generator};
use turnstile_core::error::BackendError;

pub struct BlockingBackend<G: Generator> {
    inner: Arc<G>,
}

impl<G: Generator> BlockingBackend<G> {
    pub fn new(generator: G) -> Self {
        Self {
            inner: Arc::new(generator),
        }
    }
}

#[async_trait]
impl<G: Generator> Backend for BlockingBackend<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.generate(&request))
            .await
            .map_err(|e| BackendError::Worker(format!("generation task failed: {e}")))?
    }
}
