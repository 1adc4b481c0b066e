//! NVIDIA NIM Chat Completions Proxy
//!
//! Accepts OpenAI-style chat completion requests, fills in defaults, injects
//! the NIM credential and relays the upstream answer, buffered or streamed,
//! back to the caller.
//!
//! ## Module Structure
//!
//! - `config`: Immutable proxy configuration and request defaults
//! - `types`: Upstream request shape and static listing payloads
//! - `error`: Error taxonomy and its HTTP mapping
//! - `upstream`: reqwest client for the NIM endpoint
//! - `stream`: Line relay for streamed responses
//! - `server`: axum router, handlers and startup

pub mod config;
pub mod error;
pub mod server;
pub mod stream;
pub mod types;
pub mod upstream;

pub use config::{ProxyConfig, RequestDefaults};
pub use error::{ProxyError, Result};
pub use server::{router, run_server, ProxyState};
pub use types::ChatCompletionRequest;
pub use upstream::NimClient;
