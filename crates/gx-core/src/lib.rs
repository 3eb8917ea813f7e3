//! # gx-core
//!
//! Core crate for the GDAX streaming client, providing:
//!
//! - **Configuration** (`config`) — JSON config deserialization and validation
//! - **Error types** (`error`) — domain-specific `GxError` via thiserror
//! - **Logging** (`logging`) — tracing-based structured logging
//! - **WebSocket** (`ws`) — transport task, outbound sender, connection-state events

pub mod config;
pub mod error;
pub mod logging;
pub mod ws;

pub use error::{GxError, Result};
