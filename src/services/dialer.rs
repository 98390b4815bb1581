use std::sync::Arc;
use std::time::Duration;

use crate::domains::frame::{AccountDescriptor, Metadata, OpenFrame, ACCOUNT_ID_KEY};
use crate::error::{BtpError, Result};
use crate::services::session::SessionEngine;
use crate::services::transport::{open_stream, unary_call};

/// Client side: one stream to the remote listener plus the unary account calls.
pub struct Dialer {
    server: String,
    account_id: String,
    timeout: Duration,
}

impl Dialer {
    pub fn new(server: impl Into<String>, account_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            account_id: account_id.into(),
            timeout,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub async fn connect(&self, engine: &Arc<SessionEngine>) -> Result<()> {
        let mut metadata = Metadata::new();
        metadata.insert(ACCOUNT_ID_KEY.to_string(), self.account_id.clone());
        let channel = open_stream(&self.server, metadata).await?;
        engine.attach_upstream(channel).await;
        tracing::info!(server = %self.server, account = %self.account_id, "connected to btp listener");
        Ok(())
    }

    pub async fn add_account(&self, account: AccountDescriptor) -> Result<()> {
        self.unary(OpenFrame::AddAccount { account }).await
    }

    pub async fn update_connection_status(&self, is_connected: bool) -> Result<()> {
        self.unary(OpenFrame::ConnectionChange {
            account_id: self.account_id.clone(),
            is_connected,
        })
        .await
    }

    async fn unary(&self, open: OpenFrame) -> Result<()> {
        let reply = tokio::time::timeout(self.timeout, unary_call(&self.server, &open))
            .await
            .map_err(|_| BtpError::Runtime(format!("no reply from {}", self.server)))??;
        if reply.ok {
            Ok(())
        } else {
            Err(BtpError::Rejected(reply.message.unwrap_or_default()))
        }
    }
}
