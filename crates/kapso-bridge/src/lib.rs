//! Kapso Bridge - WhatsApp ↔ agent gateway plumbing
//!
//! This crate provides the components of the kapso-whatsapp bridge:
//! - Kapso WhatsApp Cloud API client (send / list / media URLs)
//! - Delivery sources (poller, webhook receiver) with fan-in deduplication
//! - Admission guard (allowlist, rate limiting, roles, session isolation)
//! - OpenClaw gateway WebSocket client
//! - Reply relay (transcript tailing, Markdown transcoding, segmentation)
//! - Tailscale funnel adapter

#![warn(missing_docs)]

pub mod config;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod kapso;
pub mod relay;
pub mod security;
pub mod shutdown;
pub mod tailscale;

pub use error::{Error, Result};

// Re-export the configuration root
pub use config::Config;

// Re-export delivery primitives
pub use delivery::{Event, Source};
pub use delivery::merge::Merge;
pub use delivery::poller::Poller;
pub use delivery::webhook::WebhookServer;

// Re-export the guard
pub use security::{Guard, Verdict};

// Re-export the gateway client
pub use gateway::GatewayClient;

// Re-export the relay
pub use relay::{ClaimTracker, Relay};
