//! Bridge initialization and main run loop
//!
//! Wires the delivery sources, merge, guard, gateway, and relay together,
//! then consumes events until a shutdown signal arrives.

use anyhow::{bail, Context, Result};
use kapso_bridge::delivery::extract::ensure_plus;
use kapso_bridge::delivery::{Event, Source};
use kapso_bridge::kapso::Client;
use kapso_bridge::relay::{ClaimTracker, Relay};
use kapso_bridge::shutdown::{wait_for_shutdown_signal, CancellationToken};
use kapso_bridge::{tailscale, Config, GatewayClient, Guard, Merge, Poller, Verdict, WebhookServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Dedup set purge cadence.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Event channel capacity between merge and the consume loop.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Run the bridge until a shutdown signal.
pub async fn run() -> Result<()> {
    info!("starting kapso-whatsapp bridge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load().context("failed to load configuration")?;
    config.validate();

    if config.kapso.api_key.is_empty() || config.kapso.phone_number_id.is_empty() {
        bail!("KAPSO_API_KEY and KAPSO_PHONE_NUMBER_ID must be set");
    }

    let mode = config.delivery.mode.clone();
    let webhook_mode = mode == "tailscale" || mode == "domain";
    if webhook_mode && config.webhook.verify_token.is_empty() {
        bail!("KAPSO_WEBHOOK_VERIFY_TOKEN must be set when using tailscale or domain mode");
    }

    // Gateway connection is fatal on failure; the process manager restarts us.
    let gateway = Arc::new(
        GatewayClient::connect(&config.gateway.url, &config.gateway.token)
            .await
            .context("failed to connect to gateway")?,
    );

    let client = Arc::new(
        Client::new(&config.kapso.api_key, &config.kapso.phone_number_id)
            .context("failed to create Kapso client")?,
    );

    let cancel = CancellationToken::new();

    // Select delivery sources for the configured mode.
    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    let run_polling = mode == "polling" || config.delivery.poll_fallback;

    if run_polling {
        sources.push(Arc::new(Poller::new(
            Arc::clone(&client),
            Duration::from_secs(config.delivery.poll_interval),
            &config.state.dir,
        )));
        info!(
            interval_secs = config.delivery.poll_interval,
            gateway = %config.gateway.url,
            session = %config.gateway.session_key,
            "polling enabled"
        );
    }

    let mut funnel = None;
    if webhook_mode {
        sources.push(Arc::new(WebhookServer::new(
            &config.webhook.addr,
            &config.webhook.verify_token,
            &config.webhook.secret,
            Arc::clone(&client),
        )));

        if mode == "tailscale" {
            let port = config
                .webhook
                .addr
                .rsplit(':')
                .next()
                .unwrap_or(&config.webhook.addr);
            let (webhook_url, child) = tailscale::start_funnel(port)
                .await
                .context("tailscale funnel")?;
            funnel = Some(child);
            info!(url = %webhook_url, "register this webhook URL in Kapso");
        } else {
            info!(
                addr = %config.webhook.addr,
                "webhook server enabled, point your reverse proxy at it"
            );
        }
    }

    if sources.is_empty() {
        bail!("no delivery source configured");
    }

    // Fan-in + dedup.
    let merge = Arc::new(Merge::new(sources));
    let (events_tx, events_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);

    let merge_task = {
        let merge = Arc::clone(&merge);
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(error) = merge.run(cancel, events_tx).await {
                error!(%error, "merge failed");
            }
        })
    };
    {
        let merge = Arc::clone(&merge);
        let cancel = cancel.child_token();
        tokio::spawn(async move { merge.start_cleanup(cancel, CLEANUP_INTERVAL).await });
    }

    let guard = Arc::new(Guard::new(&config.security));
    info!(
        mode = %config.security.mode,
        session_isolation = config.security.session_isolation,
        rate_limit = config.security.rate_limit,
        rate_window_secs = config.security.rate_window,
        "security guard ready"
    );

    let relay = Arc::new(Relay::new(
        &config.gateway.sessions_json,
        Arc::clone(&client),
        Arc::new(ClaimTracker::new()),
    ));

    let consume_task = tokio::spawn(consume_events(
        events_rx,
        Arc::clone(&guard),
        Arc::clone(&gateway),
        Arc::clone(&client),
        Arc::clone(&relay),
        config.gateway.session_key.clone(),
        cancel.child_token(),
    ));

    wait_for_shutdown_signal().await;
    info!("shutting down");
    cancel.cancel();

    if let Some(child) = funnel {
        tailscale::stop_funnel(child).await;
    }
    gateway.close().await;

    let _ = merge_task.await;
    let _ = consume_task.await;

    info!("shutdown complete");
    Ok(())
}

/// Pull events off the merged stream, run admission, forward to the
/// gateway, and spawn a relay task per forwarded message.
async fn consume_events(
    mut events: mpsc::Receiver<Event>,
    guard: Arc<Guard>,
    gateway: Arc<GatewayClient>,
    client: Arc<Client>,
    relay: Arc<Relay>,
    base_session_key: String,
    cancel: CancellationToken,
) {
    while let Some(event) = events.recv().await {
        match guard.check(&event.from).await {
            Verdict::Deny => {
                warn!(from = %event.from, "blocked unauthorized sender");
                let deny_message = guard.deny_message();
                if !deny_message.is_empty() {
                    let to = ensure_plus(&event.from);
                    if let Err(error) = client.send_text(&to, deny_message).await {
                        warn!(to = %to, %error, "failed to send deny message");
                    }
                }
                continue;
            }
            Verdict::RateLimited => {
                warn!(from = %event.from, "rate limited sender");
                continue;
            }
            Verdict::Allow => {}
        }

        let role = guard.role(&event.from);
        let session_key = guard.session_key(&base_session_key, &event.from);
        let tagged = format!(
            "From: {} ({}) [role: {}]\n{}",
            event.from, event.name, role, event.text
        );

        if let Err(error) = gateway.send(&session_key, &event.id, &tagged).await {
            error!(id = %event.id, %error, "failed to forward message");
            continue;
        }
        info!(
            id = %event.id,
            from = %event.from,
            role = %role,
            session = %session_key,
            "forwarded message"
        );

        let relay = Arc::clone(&relay);
        let cancel = cancel.clone();
        let from = event.from.clone();
        tokio::spawn(async move {
            relay
                .deliver(cancel, &from, &session_key, chrono::Utc::now())
                .await;
        });
    }
}
