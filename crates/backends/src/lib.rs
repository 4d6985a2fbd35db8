//! Text-generation backends for Turnstile.
//!
//! All backends implement `turnstile_core::Backend`.
//! [`build_from_config`] selects one from the `[backend]` config section.

pub mod blocking;
pub mod echo;
pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use turnstile_config::BackendConfig;
use turnstile_core::backend::Backend;
use turnstile_core::error::BackendError;

pub use blocking::BlockingBackend;
pub use echo::EchoBackend;
pub use openai_compat::OpenAiCompatBackend;

/// Build the configured backend.
pub fn build_from_config(config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let backend: Arc<dyn Backend> = match config.kind.as_str() {
        "echo" => Arc::new(EchoBackend),
        "ollama" => Arc::new(OpenAiCompatBackend::ollama(
            config.api_url.as_deref(),
            &config.model,
            timeout,
        )?),
        "openai_compat" | "openai" => {
            let base_url = config.api_url.clone().ok_or_else(|| {
                BackendError::NotConfigured("backend.api_url is required for openai_compat".into())
            })?;
            Arc::new(OpenAiCompatBackend::new(
                "openai_compat",
                base_url,
                config.api_key.clone().unwrap_or_default(),
                &config.model,
                timeout,
            )?)
        }
        other => {
            return Err(BackendError::NotConfigured(format!(
                "unknown backend kind: {other}"
            )));
        }
    };

    info!(backend = %backend.name(), model = %config.model, "Backend ready");
    Ok(backend)
}
