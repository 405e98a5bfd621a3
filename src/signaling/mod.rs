//! Signaling client/service (C2): assigns context ids, assigns per-context
//! vaddrs, resolves vaddr -> URI.

mod client;
mod protocol;
mod service;

pub use client::SignalingClient;
pub use protocol::{SignalingRequest, SignalingResponse};
pub use service::SignalingService;
