//! # Turnstile Core
//!
//! Domain types, traits, and error definitions for the Turnstile
//! tool-calling orchestrator. Every other crate depends inward on this one.
//!
//! - [`Tool`] / [`BlockingTool`] and the lazily-resolving [`ToolRegistry`]
//! - [`Profile`], the immutable persona a conversation runs under
//! - [`Backend`], the opaque text-generation engine
//! - [`ChatResponse`], what one run of the conversation loop produces

pub mod backend;
pub mod chat;
pub mod error;
pub mod message;
pub mod profile;
pub mod registry;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, GenerationRequest, Generator};
pub use chat::ChatResponse;
pub use error::{BackendError, Error, Result, SessionError, ToolError};
pub use message::{Message, Role};
pub use profile::Profile;
pub use registry::{ToolImpl, ToolRegistry};
pub use tool::{BlockingTool, Tool, ToolArguments, ToolCall, ToolResult, ToolSpec};
