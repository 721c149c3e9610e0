//! Thin RPC boundary over the chat gateway's HTTP surface.
//!
//! The gateway is an external service; everything here is a typed wrapper
//! around its endpoints plus the transient-failure taxonomy the watcher
//! recovers from.

mod client;
mod error;

pub use client::{GatewayClient, RawMessage, RoomInfo, SsoLogin, WatchResponse};
pub use error::GatewayError;
