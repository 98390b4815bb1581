use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::domains::frame::AccountDescriptor;
use crate::error::{BtpError, Result};
use crate::interfaces::handlers::{AccountHooks, DataHandler};
use crate::services::dialer::Dialer;
use crate::services::listener::Listener;
use crate::services::session::{Role, SessionEngine};

#[derive(Clone, Default)]
pub struct Handlers {
    pub data: Option<Arc<dyn DataHandler>>,
    pub account_hooks: Option<Arc<dyn AccountHooks>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_handler(mut self, handler: Arc<dyn DataHandler>) -> Self {
        self.data = Some(handler);
        self
    }

    pub fn with_account_hooks(mut self, hooks: Arc<dyn AccountHooks>) -> Self {
        self.account_hooks = Some(hooks);
        self
    }
}

#[derive(Default)]
struct ConnectionState {
    connected: bool,
    listener: Option<Listener>,
}

/// One BTP endpoint: a listener serving many peers or a dialer with a single
/// upstream, depending on the configuration.
pub struct BtpTunnel {
    config: Config,
    engine: Arc<SessionEngine>,
    dialer: Option<Dialer>,
    state: Mutex<ConnectionState>,
}

impl BtpTunnel {
    pub fn new(config: Config, handlers: Handlers) -> Result<Self> {
        let role = config.role()?;
        if role == Role::Listener && handlers.account_hooks.is_none() {
            return Err(BtpError::Config(
                "listener role requires account hooks".to_string(),
            ));
        }

        let mut engine = SessionEngine::new(role).with_response_timeout(config.response_timeout());
        if let Some(handler) = handlers.data {
            engine = engine.with_data_handler(handler);
        }
        if let Some(hooks) = handlers.account_hooks {
            engine = engine.with_account_hooks(hooks);
        }

        let dialer = match (&config.server, &config.account_id, role) {
            (Some(server), Some(account_id), Role::Dialer) => Some(Dialer::new(
                server.clone(),
                account_id.clone(),
                config.response_timeout(),
            )),
            _ => None,
        };

        Ok(Self {
            config,
            engine: Arc::new(engine),
            dialer,
            state: Mutex::new(ConnectionState::default()),
        })
    }

    pub fn from_config_path<P: AsRef<Path>>(path: P, handlers: Handlers) -> Result<Self> {
        let config = Config::from_file(path)?;
        Self::new(config, handlers)
    }

    pub fn is_server(&self) -> bool {
        self.engine.role() == Role::Listener
    }

    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }

    /// Starts the listener or opens the upstream stream. Calling it again
    /// while connected does nothing.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.connected {
            return Ok(());
        }

        if let Some(addr) = self.config.listen_addr() {
            state.listener = Some(Listener::bind(&addr, self.engine.clone()).await?);
        }
        if let Some(dialer) = &self.dialer {
            dialer.connect(&self.engine).await?;
        }

        state.connected = true;
        Ok(())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.state.lock().await;
        state.listener.as_ref().map(Listener::local_addr)
    }

    /// `peer_id` is required for a listener and ignored by a dialer.
    pub async fn send_data(&self, payload: impl Into<Bytes>, peer_id: Option<&str>) -> Result<Bytes> {
        self.engine.send_data(payload.into(), peer_id).await
    }

    pub async fn add_account(&self, account: AccountDescriptor) -> Result<()> {
        self.require_dialer("add_account")?.add_account(account).await
    }

    pub async fn update_connection_status(&self, is_connected: bool) -> Result<()> {
        self.require_dialer("update_connection_status")?
            .update_connection_status(is_connected)
            .await
    }

    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(listener) = state.listener.take() {
            listener.shutdown();
        }
        self.engine.close_all().await;
        state.connected = false;
    }

    fn require_dialer(&self, operation: &str) -> Result<&Dialer> {
        self.dialer.as_ref().ok_or_else(|| {
            BtpError::Config(format!("{operation} is only available when dialing a server"))
        })
    }
}
