use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::domains::frame::{AccountDescriptor, OpenFrame, ReplyFrame};
use crate::error::{BtpError, Result};
use crate::services::session::SessionEngine;
use crate::services::transport::{read_frame, stream_channel, write_frame};

/// How long an accepted connection may stay silent before its open frame.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts peer connections and hands stream calls to the session engine.
pub struct Listener {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Listener {
    pub async fn bind(addr: &str, engine: Arc<SessionEngine>) -> Result<Self> {
        Self::bind_with_open_timeout(addr, engine, DEFAULT_OPEN_TIMEOUT).await
    }

    pub async fn bind_with_open_timeout(
        addr: &str,
        engine: Arc<SessionEngine>,
        open_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "btp listener started");
        let accept_task = tokio::spawn(accept_loop(listener, engine, open_timeout));
        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, engine: Arc<SessionEngine>, open_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, engine, open_timeout).await {
                        tracing::warn!(%remote, error = %err, "rejected connection");
                    }
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    engine: Arc<SessionEngine>,
    open_timeout: Duration,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let open: OpenFrame = tokio::time::timeout(open_timeout, read_frame(&mut stream))
        .await
        .map_err(|_| BtpError::Runtime("no open frame before timeout".to_string()))??
        .ok_or_else(|| BtpError::Runtime("connection closed before open frame".to_string()))?;

    match open {
        OpenFrame::Stream { metadata } => {
            engine.register_peer(stream_channel(stream, metadata)).await?;
        }
        OpenFrame::AddAccount { account } => {
            let reply = add_account(&engine, &account);
            write_frame(&mut stream, &reply).await?;
        }
        OpenFrame::ConnectionChange {
            account_id,
            is_connected,
        } => {
            let reply = connection_change(&engine, &account_id, is_connected);
            write_frame(&mut stream, &reply).await?;
        }
    }
    Ok(())
}

fn add_account(engine: &SessionEngine, account: &AccountDescriptor) -> ReplyFrame {
    match engine.account_hooks() {
        Some(hooks) => {
            tracing::info!(account = %account.id, "account added");
            hooks.on_account_added(&account.id, &account.info);
            ReplyFrame::ok()
        }
        None => ReplyFrame::rejected("no account handler registered"),
    }
}

fn connection_change(engine: &SessionEngine, account_id: &str, is_connected: bool) -> ReplyFrame {
    match engine.account_hooks() {
        Some(hooks) => {
            tracing::info!(account = %account_id, is_connected, "account connection changed");
            hooks.on_connection_changed(account_id, is_connected);
            ReplyFrame::ok()
        }
        None => ReplyFrame::rejected("no connection change handler registered"),
    }
}
