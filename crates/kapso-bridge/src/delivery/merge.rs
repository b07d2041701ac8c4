//! Source fan-in with message-ID deduplication
//!
//! All sources run concurrently and feed an internal bounded channel. Each
//! event passes the seen-set exactly once; duplicates (e.g. the same message
//! arriving via both poller and webhook) are dropped. The seen-set is purged
//! periodically to bound memory, trading a worst case of one redelivery per
//! purge interval.

use crate::delivery::{Event, Source};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Internal fan-in channel capacity.
const CHANNEL_CAPACITY: usize = 64;

/// Fans in multiple [`Source`]s with deduplication by [`Event::id`].
pub struct Merge {
    sources: Vec<Arc<dyn Source>>,
    seen: Arc<Mutex<HashSet<String>>>,
}

impl Merge {
    /// Create a merge over the given sources.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self {
            sources,
            seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run all sources concurrently, forwarding unique events to `out`.
    ///
    /// Returns when every source has finished; `out` is closed by dropping
    /// the sender so the consumer drains cleanly.
    pub async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Event>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Event>(CHANNEL_CAPACITY);

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let tx = tx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                if let Err(error) = source.run(cancel.clone(), tx).await {
                    if !cancel.is_cancelled() {
                        warn!(%error, "delivery source failed");
                    }
                }
            });
        }
        // The internal channel closes once every source task has dropped
        // its sender.
        drop(tx);

        while let Some(event) = rx.recv().await {
            let inserted = self.seen.lock().await.insert(event.id.clone());
            if !inserted {
                debug!(id = %event.id, "skipping duplicate message");
                continue;
            }
            if out.send(event).await.is_err() {
                break;
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Periodically clear the seen-set until cancellation.
    pub async fn start_cleanup(&self, cancel: CancellationToken, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let mut seen = self.seen.lock().await;
                    let purged = seen.len();
                    seen.clear();
                    if purged > 0 {
                        debug!(purged, "cleared dedup set");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// A source that emits a fixed list of events and exits.
    struct FixedSource {
        events: Vec<Event>,
    }

    #[async_trait]
    impl Source for FixedSource {
        async fn run(&self, _cancel: CancellationToken, out: mpsc::Sender<Event>) -> Result<()> {
            for event in &self.events {
                if out.send(event.clone()).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            from: "15551230000".to_string(),
            name: String::new(),
            text: "hi".to_string(),
        }
    }

    #[tokio::test]
    async fn forwards_unique_events_and_drops_duplicates() {
        let first = Arc::new(FixedSource {
            events: vec![event("a"), event("b")],
        }) as Arc<dyn Source>;
        let second = Arc::new(FixedSource {
            events: vec![event("b"), event("c"), event("a")],
        }) as Arc<dyn Source>;
        let merge = Merge::new(vec![first, second]);

        let (tx, mut rx) = mpsc::channel(16);
        merge.run(CancellationToken::new(), tx).await.unwrap();

        let mut ids = Vec::new();
        while let Some(event) = rx.recv().await {
            ids.push(event.id);
        }
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn output_closes_when_all_sources_finish() {
        let merge = Merge::new(vec![Arc::new(FixedSource {
            events: vec![event("only")],
        }) as Arc<dyn Source>]);

        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let run = tokio::spawn(async move { merge.run(cancel, tx).await });

        assert_eq!(rx.recv().await.unwrap().id, "only");
        assert!(rx.recv().await.is_none());
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cleanup_purge_allows_redelivery() {
        let merge = Arc::new(Merge::new(vec![]));

        // Seed the seen-set directly, purge, and check a duplicate would pass.
        merge.seen.lock().await.insert("x".to_string());
        assert!(!merge.seen.lock().await.insert("x".to_string()));

        let cancel = CancellationToken::new();
        let cleanup = {
            let merge = Arc::clone(&merge);
            let cancel = cancel.clone();
            tokio::spawn(
                async move { merge.start_cleanup(cancel, Duration::from_millis(10)).await },
            )
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        cleanup.await.unwrap();

        assert!(merge.seen.lock().await.insert("x".to_string()));
    }
}
