//! # gx-runner
//!
//! Connects to the GDAX feed, subscribes to the configured products and logs
//! what arrives. When the venue drops the socket the runner builds a fresh
//! client and subscribes the same products again, following the `reconnect`
//! section of the config.
//!
//! # Usage
//!
//! ```bash
//! gx-runner config.json --log-level info
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gx_core::config::AppConfig;
use gx_stream::{ChannelStream, GdaxStreamingClient, gdax};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// GDAX market data stream runner.
#[derive(Parser)]
#[command(name = "gx-runner", about = "GDAX market data stream runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = gx_core::config::load_config(&cli.config)?;

    // 2. Initialize logging (CLI dir wins over the config's log_path)
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    gx_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());

    info!(
        "gx-runner starting, config={}, products={:?}",
        cli.config.display(),
        config.products
    );

    // 3. Connect / resubscribe until Ctrl+C or the reconnect budget runs out
    let mut channels = config.products.clone();
    let mut attempts = 0u32;

    loop {
        let (down_tx, mut down_rx) = mpsc::unbounded_channel::<String>();
        let mut client = connect(&config, down_tx)?;

        let mut all_subscribed = true;
        for channel in &channels {
            match client.subscribe(channel).await {
                Ok(stream) => {
                    tokio::spawn(consume(stream));
                }
                Err(e) => {
                    all_subscribed = false;
                    error!("subscribe {channel} failed: {e}");
                }
            }
        }
        if all_subscribed {
            attempts = 0;
        }
        info!("subscribed {} product(s), press Ctrl+C to stop", client.subscribed_channels().len());

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("shutdown signal received");
                client.disconnect().await;
                break;
            }
            Some(reason) = down_rx.recv() => {
                warn!("{reason}");
                for channel in client.subscribed_channels() {
                    if !channels.contains(&channel) {
                        channels.push(channel);
                    }
                }
                client.disconnect().await;

                let policy = &config.reconnect;
                attempts += 1;
                if !policy.allows(attempts) {
                    error!("not reconnecting (attempt {attempts}, enabled={})", policy.enabled);
                    break;
                }
                info!("reconnecting in {:?} (attempt {attempts})", policy.delay());
                tokio::time::sleep(policy.delay()).await;
            }
        }
    }

    info!("gx-runner stopped");
    Ok(())
}

/// Build and connect a client whose inactive handler reports into `down_tx`.
fn connect(config: &AppConfig, down_tx: mpsc::UnboundedSender<String>) -> Result<GdaxStreamingClient> {
    let client = gdax::builder(config)
        .on_connection_inactive(move |msg| {
            let _ = down_tx.send(msg.to_string());
        })
        .connect()?;
    Ok(client)
}

/// Log every message of one product until its stream ends.
async fn consume(mut stream: ChannelStream) {
    let product = stream.channel().to_string();
    let mut count = 0u64;
    while let Some(msg) = stream.recv().await {
        count += 1;
        let kind = gdax::json_parser::message_type(&msg).unwrap_or("?");
        match kind {
            "match" | "last_match" => info!(
                "[{product}] {kind} price={} size={} side={}",
                msg["price"], msg["size"], msg["side"]
            ),
            _ => debug!("[{product}] {kind}: {msg}"),
        }
    }
    info!("[{product}] stream closed after {count} message(s)");
}
