//! Reply relay
//!
//! After a message is forwarded to the gateway, a relay task tails the
//! agent's session transcript (append-only JSONL) until the agent produces a
//! completed reply, then sends it back to the WhatsApp sender, Markdown
//! transcoded and split into WhatsApp-sized chunks.
//!
//! Concurrent relay tasks watching the same transcript must each deliver a
//! distinct reply; the [`ClaimTracker`] makes claiming a `(file, line)` pair
//! a process-wide, first-wins operation.

use crate::delivery::extract::ensure_plus;
use crate::error::{Error, Result};
use crate::kapso::Client;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Markdown → WhatsApp transcoding and message segmentation.
pub mod format;

/// How long a relay task waits for the agent before giving up.
const REPLY_DEADLINE: Duration = Duration::from_secs(3 * 60);

/// Transcript poll cadence.
const POLL_TICK: Duration = Duration::from_secs(3);

/// Process-wide registry of claimed replies, keyed by `(file, line)`.
///
/// Passed explicitly to every relay. First claimer wins; claims are never
/// released.
#[derive(Default)]
pub struct ClaimTracker {
    claimed: Mutex<HashSet<(String, usize)>>,
}

impl ClaimTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a reply. Returns `true` for the first caller only.
    pub async fn claim(&self, file: &str, line: usize) -> bool {
        self.claimed
            .lock()
            .await
            .insert((file.to_string(), line))
    }
}

/// A completed assistant reply with its claim key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AssistantReply {
    file: String,
    line: usize,
    text: String,
}

/// Sends agent replies back to WhatsApp senders.
pub struct Relay {
    sessions_json: PathBuf,
    client: Arc<Client>,
    tracker: Arc<ClaimTracker>,
}

impl Relay {
    /// Create a relay over the agent's sessions.json index.
    #[must_use]
    pub fn new(
        sessions_json: impl Into<PathBuf>,
        client: Arc<Client>,
        tracker: Arc<ClaimTracker>,
    ) -> Self {
        Self {
            sessions_json: sessions_json.into(),
            client,
            tracker,
        }
    }

    /// Poll the session transcript until the agent replies, then send the
    /// reply to `from`. Gives up after the relay deadline.
    pub async fn deliver(
        &self,
        cancel: CancellationToken,
        from: &str,
        session_key: &str,
        since: DateTime<Utc>,
    ) {
        let to = ensure_plus(from);
        let deadline = tokio::time::Instant::now() + REPLY_DEADLINE;
        let mut ticker = tokio::time::interval(POLL_TICK);
        ticker.tick().await; // the first tick completes immediately

        loop {
            if tokio::time::Instant::now() >= deadline {
                warn!(to = %to, session_key = %session_key, "timed out waiting for agent reply");
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let session_file = match self.session_file(session_key) {
                Ok(path) => path,
                Err(error) => {
                    warn!(%error, "relay");
                    continue;
                }
            };

            let replies = match assistant_replies(&session_file, since) {
                Ok(replies) => replies,
                Err(error) => {
                    debug!(%error, "error reading session transcript");
                    continue;
                }
            };

            let mut claimed = None;
            for reply in replies {
                if self.tracker.claim(&reply.file, reply.line).await {
                    claimed = Some(reply.text);
                    break;
                }
            }
            let Some(text) = claimed else { continue };

            let text = format::markdown_to_whatsapp(&text);
            let chunks = format::split_message(&text, format::WHATSAPP_MESSAGE_LIMIT);
            for chunk in &chunks {
                if let Err(error) = self.client.send_text(&to, chunk).await {
                    warn!(to = %to, %error, "failed to send reply chunk");
                }
            }
            info!(chunks = chunks.len(), to = %to, "relayed agent reply");
            return;
        }
    }

    /// Resolve the transcript path for a session key from sessions.json.
    ///
    /// Tries the canonical `agent:KEY:KEY` entry first, then any entry whose
    /// key contains the session key.
    fn session_file(&self, session_key: &str) -> Result<PathBuf> {
        #[derive(Deserialize)]
        struct SessionEntry {
            #[serde(rename = "sessionFile", default)]
            session_file: String,
        }

        let raw = std::fs::read_to_string(&self.sessions_json)?;
        let sessions: BTreeMap<String, SessionEntry> = serde_json::from_str(&raw)
            .map_err(|e| Error::Relay(format!("parse sessions.json: {e}")))?;

        let canonical = format!("agent:{session_key}:{session_key}");
        if let Some(entry) = sessions.get(&canonical) {
            if !entry.session_file.is_empty() {
                return Ok(PathBuf::from(&entry.session_file));
            }
        }

        for (key, entry) in &sessions {
            if key.contains(session_key) && !entry.session_file.is_empty() {
                return Ok(PathBuf::from(&entry.session_file));
            }
        }

        Err(Error::Relay(format!(
            "no session file for key {session_key:?} in {}",
            self.sessions_json.display()
        )))
    }
}

/// One transcript line, as far as the relay cares.
#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    #[serde(rename = "type", default)]
    entry_type: String,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    message: TranscriptMessage,
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptMessage {
    #[serde(default)]
    role: String,
    #[serde(rename = "stopReason", default)]
    stop_reason: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: String,
}

/// Scan a transcript for completed assistant turns recorded at or after
/// `since`, in file order. Unparseable lines are skipped.
fn assistant_replies(path: &Path, since: DateTime<Utc>) -> Result<Vec<AssistantReply>> {
    let raw = std::fs::read_to_string(path)?;
    let file = path.to_string_lossy().into_owned();

    let mut replies = Vec::new();
    for (line_index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Ok(entry) = serde_json::from_str::<TranscriptEntry>(line) else {
            continue;
        };

        if entry.entry_type != "message" {
            continue;
        }
        let Some(timestamp) = entry.timestamp else {
            continue;
        };
        if timestamp < since {
            continue;
        }
        if entry.message.role != "assistant" || entry.message.stop_reason != "stop" {
            continue;
        }

        let texts: Vec<&str> = entry
            .message
            .content
            .iter()
            .filter(|block| block.block_type == "text" && !block.text.is_empty())
            .map(|block| block.text.as_str())
            .collect();
        if !texts.is_empty() {
            replies.push(AssistantReply {
                file: file.clone(),
                line: line_index,
                text: texts.join("\n"),
            });
        }
    }

    Ok(replies)
}
