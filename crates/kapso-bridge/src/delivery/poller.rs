//! Interval poller against the Kapso list-messages API
//!
//! Pulls inbound messages on a fixed cadence and advances a persisted
//! cursor to `max(timestamp) + 1s` of the messages it emitted. On a cold
//! start with no cursor file the cursor is set to now, so history is not
//! replayed.

use crate::delivery::{extract, Event, Source};
use crate::error::Result;
use crate::kapso::{Client, ListMessagesParams};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Page size for each poll.
const POLL_LIMIT: u32 = 100;

/// Polls the Kapso API for inbound messages.
pub struct Poller {
    client: Arc<Client>,
    interval: Duration,
    state_dir: PathBuf,
    state_file: PathBuf,
}

impl Poller {
    /// Create a poller. The cursor is persisted as `<state_dir>/last-poll`.
    #[must_use]
    pub fn new(client: Arc<Client>, interval: Duration, state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        let state_file = state_dir.join("last-poll");
        Self {
            client,
            interval,
            state_dir,
            state_file,
        }
    }

    async fn poll(&self, cursor: &mut DateTime<Utc>, out: &mpsc::Sender<Event>) {
        let params = ListMessagesParams {
            direction: "inbound".to_string(),
            since: format_cursor(*cursor),
            limit: POLL_LIMIT,
            after: String::new(),
        };

        let response = match self.client.list_messages(params).await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "poll failed");
                return;
            }
        };

        if response.data.is_empty() {
            return;
        }

        let mut newest: Option<DateTime<Utc>> = None;
        let mut forwarded = 0usize;

        for inbound in &response.data {
            let Some(text) = extract::extract_text(&inbound.message, &self.client).await else {
                continue;
            };

            let name = inbound
                .kapso
                .as_ref()
                .map(|k| k.contact_name.clone())
                .unwrap_or_default();

            let event = Event {
                id: inbound.message.id.clone(),
                from: inbound.message.from.clone(),
                name,
                text,
            };
            if out.send(event).await.is_err() {
                return;
            }
            forwarded += 1;

            if let Some(timestamp) = parse_timestamp(&inbound.message.timestamp) {
                if newest.map_or(true, |n| timestamp > n) {
                    newest = Some(timestamp);
                }
            }
        }

        if forwarded > 0 {
            info!(count = forwarded, "forwarded message(s)");
        }

        if let Some(newest) = newest {
            *cursor = newest + chrono::Duration::seconds(1);
            if let Err(error) = save_cursor(&self.state_file, *cursor) {
                warn!(%error, "failed to persist poll cursor");
            }
        }
    }
}

#[async_trait]
impl Source for Poller {
    async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Event>) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;

        let mut cursor = match load_cursor(&self.state_file) {
            Some(cursor) => cursor,
            None => {
                let now = Utc::now();
                save_cursor(&self.state_file, now)?;
                info!(cursor = %format_cursor(now), "first run, starting from now");
                now
            }
        };

        // Poll immediately, then on interval.
        self.poll(&mut cursor, &out).await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => self.poll(&mut cursor, &out).await,
            }
        }
    }
}

/// Parse a message timestamp: RFC3339, or Unix epoch seconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(seconds) = raw.trim().parse::<i64>() {
        return Utc.timestamp_opt(seconds, 0).single();
    }
    None
}

fn format_cursor(cursor: DateTime<Utc>) -> String {
    cursor.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Read the persisted cursor, if any.
fn load_cursor(path: &Path) -> Option<DateTime<Utc>> {
    let raw = std::fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Persist the cursor atomically (write to temp, then rename).
fn save_cursor(path: &Path, cursor: DateTime<Utc>) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, format_cursor(cursor))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
