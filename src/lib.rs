//! Signed relay service
//!
//! Registered parties exchange payloads whose authenticity anyone can
//! check against the sender's Ed25519 public key.
//!
//! ## Architecture
//!
//! - **Registry**: each username is bound to one public key, forever
//! - **Sessions**: stateless HMAC-signed bearer credentials, 60 minutes
//! - **Verification**: exact-bytes Ed25519 checks, malformed vs invalid kept apart
//! - **Mailbox**: per-recipient append-only relay queues, sender taken from the session
//! - **Audit log**: one entry per request, whatever the outcome

pub mod api;
pub mod audit_log;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod mailbox;
pub mod registry;
pub mod state;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
