//! CLI for the kapso-whatsapp bridge
//!
//! Commands:
//! - `run`: start the bridge (default when no command is given)
//! - `send`: send a one-off WhatsApp text message
//! - `status`: check the local webhook server's health endpoint

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kapso_bridge::kapso::Client;
use kapso_bridge::Config;

/// Kapso WhatsApp bridge CLI
#[derive(Parser, Debug)]
#[command(name = "kapso-whatsapp")]
#[command(about = "Bridge WhatsApp (via Kapso) to an OpenClaw agent gateway")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge (default)
    Run,
    /// Send a text message
    Send {
        /// Recipient phone number (+E.164)
        #[arg(long)]
        to: Option<String>,
        /// Message body
        #[arg(long)]
        text: Option<String>,
        /// Positional form: `send +NUMBER "message"`
        #[arg(value_name = "ARGS", num_args = 0..=2)]
        positional: Vec<String>,
    },
    /// Check webhook server health
    Status,
}

/// Send a one-off text message via the Kapso API.
pub async fn send(to: Option<String>, text: Option<String>, positional: Vec<String>) -> Result<()> {
    let mut to = to;
    let mut text = text;
    for arg in positional {
        if to.is_none() && arg.starts_with('+') {
            to = Some(arg);
        } else if text.is_none() {
            text = Some(arg);
        }
    }

    let (Some(to), Some(text)) = (to, text) else {
        bail!("usage: kapso-whatsapp send --to +NUMBER --text \"message\"");
    };

    let mut config = Config::load().context("failed to load config")?;
    config.validate();

    if config.kapso.api_key.is_empty() || config.kapso.phone_number_id.is_empty() {
        bail!("KAPSO_API_KEY and KAPSO_PHONE_NUMBER_ID must be set");
    }

    let client = Client::new(config.kapso.api_key, config.kapso.phone_number_id)
        .context("failed to create Kapso client")?;
    let message_id = client.send_text(&to, &text).await?;

    if message_id.is_empty() {
        println!("sent");
    } else {
        println!("sent (id: {message_id})");
    }
    Ok(())
}

/// Probe the webhook server's `/health` endpoint.
pub async fn status() -> Result<()> {
    let mut config = Config::load().context("failed to load config")?;
    config.validate();

    let mut addr = config.webhook.addr;
    if let Some(port) = addr.strip_prefix("0.0.0.0:") {
        addr = format!("127.0.0.1:{port}");
    }
    if !addr.contains("://") {
        addr = format!("http://{addr}");
    }

    let response = reqwest::get(format!("{addr}/health"))
        .await
        .context("webhook server unreachable")?;

    if response.status().is_success() {
        println!("webhook server: ok");
        Ok(())
    } else {
        bail!("webhook server: unhealthy (status {})", response.status());
    }
}
