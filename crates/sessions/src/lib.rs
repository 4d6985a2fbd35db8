//! Durable conversation sessions for Turnstile.
//!
//! A [`Session`] is an append-only message log tied to one profile. The
//! [`SessionStore`] keeps one JSON file per session, and the janitor removes
//! sessions that were created but never used.

pub mod janitor;
pub mod session;
pub mod store;

pub use janitor::spawn_janitor;
pub use session::{Session, SessionMessage, SessionSummary};
pub use store::SessionStore;
