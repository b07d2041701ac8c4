//! OpenClaw gateway WebSocket client
//!
//! Implements the challenge/response-authenticated RPC session. The write
//! half is guarded by a mutex; a background drainer owns the read half until
//! the socket closes so server→client traffic never stalls the connection.
//!
//! Frames are JSON requests `{type:"req", id, method, params}`; responses
//! carry `{type, id?, result?, error?}`.

use crate::error::{Error, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Gateway protocol version spoken by this client.
const PROTOCOL_VERSION: u32 = 1;

/// WebSocket dial timeout.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for each handshake frame read.
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// An authenticated gateway session.
pub struct GatewayClient {
    url: String,
    writer: Mutex<WsSink>,
    next_id: AtomicU64,
}

impl GatewayClient {
    /// Dial the gateway and complete the challenge/response handshake.
    ///
    /// Fatal on any handshake failure; the caller decides whether to exit.
    /// On success a background task drains server frames until close.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        let (mut ws, _response) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| Error::Gateway(format!("timed out connecting to {url}")))?
            .map_err(|e| Error::Gateway(format!("connect to {url}: {e}")))?;

        // The gateway speaks first with a challenge frame.
        let challenge = read_text_frame(&mut ws).await?;
        debug!(frame = %challenge, "received gateway challenge");

        let connect_id = 1u64;
        let frame = connect_frame(connect_id, token);
        ws.send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| Error::Gateway(format!("send connect: {e}")))?;

        let reply = read_text_frame(&mut ws).await?;
        let parsed: Value = serde_json::from_str(&reply)
            .map_err(|e| Error::Gateway(format!("parse connect response: {e}")))?;
        if let Some(error) = parsed.get("error").filter(|e| !e.is_null()) {
            return Err(Error::Gateway(format!("authentication rejected: {error}")));
        }

        let (writer, reader) = ws.split();
        tokio::spawn(drain(reader));

        info!(url = %url, "authenticated with gateway");

        Ok(Self {
            url: url.to_string(),
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(connect_id + 1),
        })
    }

    /// Submit a message to the agent session.
    ///
    /// The idempotency key is the provider message ID, so gateway-side
    /// deduplication holds across bridge restarts and redeliveries.
    pub async fn send(&self, session_key: &str, idempotency_key: &str, body: &str) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = chat_send_frame(id, session_key, body, idempotency_key);

        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| Error::Gateway(format!("send to {}: {e}", self.url)))
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.send(Message::Close(None)).await {
            debug!(%error, "gateway close");
        }
    }
}

/// Read the next text frame, skipping control frames, within the handshake
/// read timeout.
async fn read_text_frame(ws: &mut WsStream) -> Result<String> {
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next())
            .await
            .map_err(|_| Error::Gateway("timed out waiting for gateway frame".to_string()))?
            .ok_or_else(|| Error::Gateway("connection closed during handshake".to_string()))?
            .map_err(|e| Error::Gateway(format!("read frame: {e}")))?;

        match frame {
            Message::Text(text) => return Ok(text),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                return Err(Error::Gateway("gateway closed during handshake".to_string()))
            }
            other => {
                return Err(Error::Gateway(format!(
                    "unexpected frame during handshake: {other:?}"
                )))
            }
        }
    }
}

/// Consume server frames until the socket closes. Without this, unread
/// server events eventually stall the connection's flow control.
async fn drain(mut reader: WsSource) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => debug!(len = text.len(), "gateway event drained"),
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "gateway read failed");
                break;
            }
        }
    }
    info!("gateway connection closed");
}

fn connect_frame(id: u64, token: &str) -> Value {
    json!({
        "type": "req",
        "id": id,
        "method": "connect",
        "params": {
            "minProtocol": PROTOCOL_VERSION,
            "maxProtocol": PROTOCOL_VERSION,
            "client": {
                "id": "kapso-whatsapp",
                "displayName": "Kapso WhatsApp Bridge",
                "version": env!("CARGO_PKG_VERSION"),
                "platform": std::env::consts::OS,
                "mode": "backend",
            },
            "auth": {"token": token},
            "role": "operator",
            "scopes": ["operator.admin"],
        },
    })
}

fn chat_send_frame(id: u64, session_key: &str, message: &str, idempotency_key: &str) -> Value {
    json!({
        "type": "req",
        "id": id,
        "method": "chat.send",
        "params": {
            "sessionKey": session_key,
            "message": message,
            "idempotencyKey": idempotency_key,
        },
    })
}
