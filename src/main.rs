//! kapso-whatsapp: bridge between the Kapso WhatsApp API and an OpenClaw gateway

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Cli::parse();

    let result = match args.command.unwrap_or(cli::Commands::Run) {
        cli::Commands::Run => server::run().await,
        cli::Commands::Send {
            to,
            text,
            positional,
        } => cli::send(to, text, positional).await,
        cli::Commands::Status => cli::status().await,
    };

    if let Err(error) = result {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
