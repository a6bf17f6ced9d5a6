//! HTTP layer: the WebSocket chat endpoint and a health probe.

pub mod error;
pub mod router;
pub mod ws;
