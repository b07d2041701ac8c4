//! Delivery sources and fan-in
//!
//! A [`Source`] produces inbound message [`Event`]s from one delivery
//! channel (poller, webhook). [`merge::Merge`] fans all sources into a
//! single deduplicated stream.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Content extraction for inbound messages.
pub mod extract;
/// Fan-in with message-ID deduplication.
pub mod merge;
/// Interval poller against the Kapso list API.
pub mod poller;
/// Webhook HTTP receiver.
pub mod webhook;

/// A single inbound message, normalized for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Kapso message ID (doubles as the gateway idempotency key)
    pub id: String,
    /// Sender phone number
    pub from: String,
    /// Contact display name (possibly empty)
    pub name: String,
    /// Extracted, gateway-ready text
    pub text: String,
}

/// A producer of inbound message events.
///
/// Implementations must honor cancellation promptly and close cleanly;
/// the returned error is terminal for the source, not for the bridge.
#[async_trait]
pub trait Source: Send + Sync {
    /// Run the source until cancellation, emitting events on `out`.
    async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Event>) -> Result<()>;
}
