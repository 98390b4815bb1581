use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACCOUNT_ID_KEY: &str = "accountId";

pub type Metadata = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    pub id: String,
    #[serde(default)]
    pub info: Value,
}

/// First frame on every connection; names the call the connection carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum OpenFrame {
    Stream {
        #[serde(default)]
        metadata: Metadata,
    },
    AddAccount {
        account: AccountDescriptor,
    },
    ConnectionChange {
        account_id: String,
        is_connected: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReplyFrame {
    pub fn ok() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}
