//! HTTP/WebSocket presentation adapter.
//!
//! Axum routes under `/api/v1/` with the envelope response format, a
//! per-session WebSocket and a background sweeper for idle sessions.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod sweeper;
