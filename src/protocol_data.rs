//! Sub-protocol multiplexing for BTP envelopes.
//!
//! Entries are emitted in a fixed order: `ilp` first, then any explicitly
//! named side protocols, then `custom`. Receivers that only look at the first
//! entry therefore always see the primary payload.

use bytes::Bytes;
use serde_json::Value;

use crate::domains::message::{ContentType, SubProtocol};
use crate::error::{BtpError, Result};

pub const ILP_PROTOCOL: &str = "ilp";
pub const CUSTOM_PROTOCOL: &str = "custom";

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolValue {
    Binary(Bytes),
    Text(String),
    Json(Value),
}

impl ProtocolValue {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Binary(data) => data.clone(),
            Self::Text(text) => Bytes::from(text.clone().into_bytes()),
            Self::Json(value) => Bytes::from(value.to_string().into_bytes()),
        }
    }

    fn content_type(&self) -> ContentType {
        match self {
            Self::Binary(_) => ContentType::Binary,
            Self::Text(_) => ContentType::Utf8Text,
            Self::Json(_) => ContentType::Json,
        }
    }
}

impl From<Bytes> for ProtocolValue {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for ProtocolValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

impl From<String> for ProtocolValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ProtocolValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for ProtocolValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Insertion-ordered name -> value map. Re-inserting a name replaces the
/// value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolMap {
    entries: Vec<(String, ProtocolValue)>,
}

impl ProtocolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ProtocolValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProtocolValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProtocolValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedProtocolData {
    pub protocol_map: ProtocolMap,
    pub ilp: Option<Bytes>,
    pub custom: Option<Value>,
}

pub fn encode_protocol_data(
    ilp: Option<&Bytes>,
    custom: Option<&Value>,
    extra: Option<&ProtocolMap>,
) -> Result<Vec<SubProtocol>> {
    let mut protocol_data = Vec::new();

    if let Some(ilp) = ilp {
        protocol_data.push(SubProtocol::new(
            ILP_PROTOCOL,
            ContentType::Binary,
            ilp.clone(),
        ));
    }

    if let Some(extra) = extra {
        for (name, value) in extra.iter() {
            let data = match value {
                ProtocolValue::Json(json) => json_bytes(json)?,
                other => other.to_bytes(),
            };
            protocol_data.push(SubProtocol::new(name, value.content_type(), data));
        }
    }

    if let Some(custom) = custom {
        protocol_data.push(SubProtocol::new(
            CUSTOM_PROTOCOL,
            ContentType::Json,
            json_bytes(custom)?,
        ));
    }

    Ok(protocol_data)
}

/// Single `ilp` entry, the shape of every Message and Response this crate sends.
pub fn ilp_protocol_data(ilp: Bytes) -> Vec<SubProtocol> {
    vec![SubProtocol::new(ILP_PROTOCOL, ContentType::Binary, ilp)]
}

pub fn decode_protocol_data(protocol_data: &[SubProtocol]) -> Result<DecodedProtocolData> {
    let mut protocol_map = ProtocolMap::new();

    for protocol in protocol_data {
        let value = match protocol.content_type {
            ContentType::Utf8Text => {
                let text = String::from_utf8(protocol.data.to_vec()).map_err(|e| {
                    BtpError::Decode(format!(
                        "sub-protocol {} is not valid utf-8: {e}",
                        protocol.protocol_name
                    ))
                })?;
                ProtocolValue::Text(text)
            }
            ContentType::Json => {
                let json = serde_json::from_slice(&protocol.data).map_err(|e| {
                    BtpError::Decode(format!(
                        "sub-protocol {} is not valid json: {e}",
                        protocol.protocol_name
                    ))
                })?;
                ProtocolValue::Json(json)
            }
            ContentType::Binary => ProtocolValue::Binary(protocol.data.clone()),
        };
        protocol_map.insert(protocol.protocol_name.clone(), value);
    }

    let ilp = protocol_map.get(ILP_PROTOCOL).map(ProtocolValue::to_bytes);
    let custom = match protocol_map.get(CUSTOM_PROTOCOL) {
        Some(ProtocolValue::Json(value)) => Some(value.clone()),
        Some(ProtocolValue::Text(text)) => Some(Value::String(text.clone())),
        Some(ProtocolValue::Binary(_)) => {
            tracing::debug!("ignoring binary-typed custom sub-protocol");
            None
        }
        None => None,
    };

    Ok(DecodedProtocolData {
        protocol_map,
        ilp,
        custom,
    })
}

fn json_bytes(value: &Value) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| BtpError::Serialization(e.to_string()))
}
