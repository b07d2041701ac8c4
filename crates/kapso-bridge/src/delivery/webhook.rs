//! Webhook HTTP receiver
//!
//! Receives Meta-format WhatsApp webhook events from Kapso and emits an
//! [`Event`] for every supported inbound message. Implements the Meta
//! verification handshake (GET) and optional HMAC-SHA256 signature
//! validation (POST). A `/health` endpoint answers liveness probes.

use crate::delivery::{extract, Event, Source};
use crate::error::{Error, Result};
use crate::kapso::{Client, WebhookPayload};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bound on graceful server shutdown after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Webhook HTTP server implementing [`Source`].
pub struct WebhookServer {
    addr: String,
    verify_token: String,
    secret: String,
    client: Arc<Client>,
}

/// Meta webhook verification query
#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[derive(Clone)]
struct WebhookState {
    verify_token: String,
    secret: String,
    client: Arc<Client>,
    out: mpsc::Sender<Event>,
}

impl WebhookServer {
    /// Create a webhook server bound to `addr`. An empty `secret` disables
    /// signature validation.
    #[must_use]
    pub fn new(
        addr: impl Into<String>,
        verify_token: impl Into<String>,
        secret: impl Into<String>,
        client: Arc<Client>,
    ) -> Self {
        Self {
            addr: addr.into(),
            verify_token: verify_token.into(),
            secret: secret.into(),
            client,
        }
    }

    fn router(&self, out: mpsc::Sender<Event>) -> Router {
        let state = WebhookState {
            verify_token: self.verify_token.clone(),
            secret: self.secret.clone(),
            client: Arc::clone(&self.client),
            out,
        };

        Router::new()
            .route("/webhook", get(handle_verification).post(handle_event))
            .route("/health", get(handle_health))
            .with_state(state)
    }
}

#[async_trait]
impl Source for WebhookServer {
    async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Event>) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| Error::Webhook(format!("listen on {}: {e}", self.addr)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Webhook(format!("local addr: {e}")))?;
        info!(addr = %local_addr, "webhook server listening");

        let shutdown = {
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        };
        let server = axum::serve(listener, self.router(out)).with_graceful_shutdown(shutdown);
        let mut server_task = tokio::spawn(server.into_future());

        tokio::select! {
            result = &mut server_task => {
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(Error::Webhook(format!("serve: {e}"))),
                    Err(e) => Err(Error::Webhook(format!("server task: {e}"))),
                }
            }
            _ = cancel.cancelled() => {
                // Give in-flight requests a bounded window to drain.
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server_task).await {
                    Ok(_) => {}
                    Err(_) => {
                        warn!("webhook server shutdown timed out, aborting");
                        server_task.abort();
                    }
                }
                Ok(())
            }
        }
    }
}

/// Respond to Meta's webhook verification challenge (GET).
async fn handle_verification(
    State(state): State<WebhookState>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    let mode = query.mode.as_deref().unwrap_or("");
    let token = query.verify_token.as_deref().unwrap_or("");
    let challenge = query.challenge.unwrap_or_default();

    if mode == "subscribe" && !state.verify_token.is_empty() && token == state.verify_token {
        info!("webhook verification successful");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!(mode = %mode, "webhook verification failed");
        (StatusCode::FORBIDDEN, "verification failed").into_response()
    }
}

/// Handle a webhook event delivery (POST).
///
/// The payload is acknowledged with 200 before any message is emitted, so
/// the provider never retries; deduplication downstream absorbs the
/// occasional double delivery from the poller instead.
async fn handle_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !state.secret.is_empty() {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !valid_signature(&body, signature, &state.secret) {
            warn!("webhook signature validation failed");
            return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%error, "webhook payload is not valid JSON");
            return (StatusCode::BAD_REQUEST, "invalid JSON").into_response();
        }
    };

    tokio::spawn(process_payload(state, payload));

    StatusCode::OK.into_response()
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Walk `entry[].changes[]` and emit an event per supported message.
async fn process_payload(state: WebhookState, payload: WebhookPayload) {
    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                continue;
            }

            let contacts: HashMap<&str, &str> = change
                .value
                .contacts
                .iter()
                .filter_map(|c| c.profile.as_ref().map(|p| (c.wa_id.as_str(), p.name.as_str())))
                .collect();

            for message in &change.value.messages {
                let Some(text) = extract::extract_text(message, &state.client).await else {
                    continue;
                };

                let name = contacts
                    .get(message.from.as_str())
                    .map(|n| (*n).to_string())
                    .unwrap_or_default();

                info!(id = %message.id, from = %message.from, "received webhook message");
                let event = Event {
                    id: message.id.clone(),
                    from: message.from.clone(),
                    name,
                    text,
                };
                if state.out.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Check the `X-Hub-Signature-256` HMAC over the raw body.
fn valid_signature(body: &[u8], header: &str, secret: &str) -> bool {
    let Some(signature_hex) = header.strip_prefix("sha256=") else {
        return false;
    };

    type HmacSha256 = Hmac<Sha256>;
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(signature_hex.as_bytes(), expected.as_bytes())
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests;
