//! # Turnstile Agent
//!
//! The tool-calling conversation loop. Each round renders the prompt, calls
//! the backend, parses `<tool_call>` fences out of the reply, runs the tools,
//! and feeds the results back until the backend answers without calling a
//! tool or the profile's round budget runs out.

pub mod loop_runner;
pub mod nudge;
pub mod parser;
pub mod profiles;
pub mod stream_event;

pub use loop_runner::{AgentError, ConversationLoop, EventSink};
pub use nudge::NudgePolicy;
pub use profiles::{DEFAULT_PROFILE, ProfileCatalog, ProfileInfo};
pub use stream_event::{EventKind, GenerationEvent, StreamLimits};
