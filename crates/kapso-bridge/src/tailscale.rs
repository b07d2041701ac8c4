//! Tailscale funnel adapter
//!
//! Wraps the `tailscale` CLI: resolves the node's public HTTPS URL and runs
//! `tailscale funnel <port>` as a managed child process. The orchestrator
//! owns termination: graceful signal first, forced kill after 5 seconds.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Grace period between terminate and kill.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal subset of `tailscale status --json` output.
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(rename = "Self")]
    self_node: SelfNode,
}

#[derive(Debug, Deserialize)]
struct SelfNode {
    #[serde(rename = "DNSName", default)]
    dns_name: String,
}

/// Check that the tailscale CLI is available.
pub async fn ensure_installed() -> Result<()> {
    Command::new("tailscale")
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|_| {
            Error::Config(
                "tailscale CLI not found in PATH — install from https://tailscale.com/download"
                    .to_string(),
            )
        })?;
    Ok(())
}

/// The deterministic HTTPS URL for this node, e.g.
/// `https://machine.tailnet.ts.net`.
pub async fn public_url() -> Result<String> {
    let output = Command::new("tailscale")
        .args(["status", "--json"])
        .output()
        .await
        .map_err(|e| Error::Config(format!("tailscale status: {e} (is tailscale running?)")))?;

    if !output.status.success() {
        return Err(Error::Config(format!(
            "tailscale status exited with {}",
            output.status
        )));
    }

    let status: Status = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Config(format!("parse tailscale status: {e}")))?;

    let dns = status.self_node.dns_name.trim_end_matches('.');
    if dns.is_empty() {
        return Err(Error::Config(
            "tailscale: empty DNS name — is the node connected?".to_string(),
        ));
    }

    Ok(format!("https://{dns}"))
}

/// Start `tailscale funnel <port>` in the background and return the public
/// webhook URL together with the child process. The caller owns the child
/// and must stop it on shutdown.
pub async fn start_funnel(port: &str) -> Result<(String, Child)> {
    ensure_installed().await?;
    let base_url = public_url().await?;

    let child = Command::new("tailscale")
        .args(["funnel", port])
        .spawn()
        .map_err(|e| Error::Config(format!("start tailscale funnel: {e}")))?;

    let webhook_url = format!("{base_url}/webhook");
    info!(port = %port, url = %webhook_url, "tailscale funnel started");

    Ok((webhook_url, child))
}

/// Stop a funnel child: graceful terminate, then force kill after the grace
/// period.
pub async fn stop_funnel(mut child: Child) {
    let pid = child.id();
    info!(pid = ?pid, "stopping tailscale funnel");

    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: sending SIGTERM to the child we spawned.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            warn!("tailscale funnel did not exit, killing");
            let _ = child.kill().await;
        }
    }
}
