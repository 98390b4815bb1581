use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{BtpError, Result};
use crate::services::session::{Role, DEFAULT_RESPONSE_TIMEOUT};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub port: u16,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub listener: Option<ListenerConfig>,
    pub server: Option<String>,
    pub account_id: Option<String>,
    pub response_timeout_ms: Option<u64>,
}

impl Config {
    pub fn listener(port: u16) -> Self {
        Self {
            listener: Some(ListenerConfig { port, host: None }),
            ..Self::default()
        }
    }

    pub fn dialer(server: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            account_id: Some(account_id.into()),
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| BtpError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| BtpError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Exactly one of `listener` and `server` decides the role; a dialer also
    /// needs the account id it announces to the listener.
    pub fn role(&self) -> Result<Role> {
        match (&self.listener, &self.server) {
            (Some(_), Some(_)) => Err(BtpError::Config(
                "listener and server are mutually exclusive".to_string(),
            )),
            (None, None) => Err(BtpError::Config(
                "either listener or server must be configured".to_string(),
            )),
            (Some(_), None) => Ok(Role::Listener),
            (None, Some(server)) => {
                if server.trim().is_empty() {
                    return Err(BtpError::Config("server address is empty".to_string()));
                }
                match self.account_id.as_deref().map(str::trim) {
                    Some(id) if !id.is_empty() => Ok(Role::Dialer),
                    _ => Err(BtpError::Config(
                        "account_id is required when dialing a server".to_string(),
                    )),
                }
            }
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn listen_addr(&self) -> Option<String> {
        self.listener.as_ref().map(|listener| {
            let host = listener.host.as_deref().unwrap_or("0.0.0.0");
            format!("{host}:{}", listener.port)
        })
    }
}
