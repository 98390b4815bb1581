use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use btp_tunnel::config::{Config, ListenerConfig};
use btp_tunnel::error::{BtpError, Result};
use btp_tunnel::{AccountHooks, BtpTunnel, DataHandler, Handlers};

#[derive(Parser, Debug)]
#[command(name = "btp-tunnel")]
#[command(about = "BTP over a bidirectional stream")]
struct Cli {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, env = "BTP_TUNNEL_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept peers and echo every ilp payload back to its sender.
    Listen {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value_t = 5505)]
        port: u16,
    },
    /// Dial a listener, send one base64 payload and print the reply.
    Send {
        #[arg(long, default_value = "127.0.0.1:5505")]
        server: String,

        #[arg(long, env = "BTP_TUNNEL_ACCOUNT_ID")]
        account_id: String,

        #[arg(long)]
        payload: String,
    },
}

struct EchoHandler;

#[async_trait]
impl DataHandler for EchoHandler {
    async fn handle_data(&self, from: &str, data: Bytes) -> Result<Bytes> {
        tracing::info!(peer = %from, len = data.len(), "echoing ilp payload");
        Ok(data)
    }
}

struct LoggingHooks;

impl AccountHooks for LoggingHooks {
    fn on_account_added(&self, id: &str, info: &Value) {
        tracing::info!(account = %id, %info, "add account");
    }

    fn on_account_removed(&self, id: &str) {
        tracing::info!(account = %id, "remove account");
    }

    fn on_connection_changed(&self, id: &str, is_connected: bool) {
        tracing::info!(account = %id, is_connected, "connection status");
    }
}

fn base_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if cli.timeout_ms.is_some() {
        config.response_timeout_ms = cli.timeout_ms;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,btp_tunnel=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();
    let mut config = base_config(&cli)?;

    match cli.command {
        Commands::Listen { host, port } => {
            config.server = None;
            config.listener = Some(ListenerConfig {
                port,
                host: Some(host),
            });
            let handlers = Handlers::new()
                .with_data_handler(Arc::new(EchoHandler))
                .with_account_hooks(Arc::new(LoggingHooks));
            let tunnel = BtpTunnel::new(config, handlers)?;
            tunnel.connect().await?;
            futures::future::pending::<()>().await;
            Ok(())
        }
        Commands::Send {
            server,
            account_id,
            payload,
        } => {
            config.listener = None;
            config.server = Some(server);
            config.account_id = Some(account_id);
            let payload = BASE64
                .decode(payload.trim())
                .map_err(|e| BtpError::Config(format!("payload is not base64: {e}")))?;
            let tunnel = BtpTunnel::new(config, Handlers::new())?;
            tunnel.connect().await?;
            let response = tunnel.send_data(payload, None).await?;
            println!("{}", BASE64.encode(&response));
            tunnel.disconnect().await;
            Ok(())
        }
    }
}
