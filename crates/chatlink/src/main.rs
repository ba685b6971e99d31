//! # chatlink
//!
//! `chatlink serve` runs the presence relay server.
//! `chatlink connect --identity <id>` runs a connection client and prints
//! status and roster changes until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chatlink_client::{ClientConfig, ClientEvent, ConnectionClient, WebSocketTransport};
use chatlink_core::{PeerId, Visibility};
use chatlink_core::logging::init_subscriber;
use chatlink_server::{ChatlinkServer, ServerConfig};
use chatlink_settings::ChatlinkSettings;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

/// Persistent messaging connection: relay server and client.
#[derive(Parser, Debug)]
#[command(name = "chatlink", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.chatlink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// Skip installing the Prometheus recorder.
        #[arg(long)]
        no_metrics: bool,
    },
    /// Connect to a relay server and print what happens.
    Connect {
        /// Identity to connect as.
        #[arg(long)]
        identity: String,
        /// Server URL (overrides settings).
        #[arg(long)]
        url: Option<String>,
        /// Start with background visibility (longer heartbeat interval).
        #[arg(long)]
        background: bool,
    },
}

fn load_settings(path: Option<PathBuf>) -> Result<&'static ChatlinkSettings> {
    let path = path.unwrap_or_else(chatlink_settings::settings_path);
    let settings = chatlink_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    let _ = chatlink_settings::init_settings(settings);
    Ok(chatlink_settings::get_settings())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings)?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    init_subscriber(level, settings.logging.format);

    match cli.command {
        Command::Serve {
            host,
            port,
            no_metrics,
        } => serve(settings, host, port, no_metrics).await,
        Command::Connect {
            identity,
            url,
            background,
        } => connect(settings, identity, url, background).await,
    }
}

async fn serve(
    settings: &ChatlinkSettings,
    host: Option<String>,
    port: Option<u16>,
    no_metrics: bool,
) -> Result<()> {
    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let mut server = ChatlinkServer::new(config);
    if !no_metrics {
        let handle = chatlink_server::metrics::install_recorder()
            .context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("chatlink relay listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server
        .shutdown()
        .graceful_shutdown(vec![handle], None)
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn connect(
    settings: &ChatlinkSettings,
    identity: String,
    url: Option<String>,
    background: bool,
) -> Result<()> {
    let mut config = ClientConfig::from(&settings.client);
    if let Some(url) = url {
        config.server_url = url;
    }

    let client = ConnectionClient::spawn(config, Arc::new(WebSocketTransport))
        .context("Invalid client configuration")?;
    let mut events = client.subscribe();
    if background {
        client.set_visibility(Visibility::Background)?;
    }
    client.connect(identity).context("Failed to request connection")?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

/// One line per client event.
fn describe(event: &ClientEvent) -> String {
    match event {
        ClientEvent::StatusChanged { from, to } => format!("status  {from} -> {to}"),
        ClientEvent::RosterUpdated(peers) => {
            let ids: Vec<&str> = peers.iter().map(PeerId::as_str).collect();
            format!("online  [{}]", ids.join(", "))
        }
        ClientEvent::RetriesExhausted { attempts } => {
            format!("gave up after {attempts} reconnect attempts; run connect again to retry")
        }
        ClientEvent::Message { event, data } => format!("message {event} {data}"),
    }
}
