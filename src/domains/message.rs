use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::BtpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Response = 1,
    Error = 2,
    Prepare = 3,
    Fulfill = 4,
    Reject = 5,
    Transfer = 6,
    Message = 7,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Response),
            2 => Some(Self::Error),
            3 => Some(Self::Prepare),
            4 => Some(Self::Fulfill),
            5 => Some(Self::Reject),
            6 => Some(Self::Transfer),
            7 => Some(Self::Message),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Response => "TYPE_RESPONSE",
            Self::Error => "TYPE_ERROR",
            Self::Prepare => "TYPE_PREPARE",
            Self::Fulfill => "TYPE_FULFILL",
            Self::Reject => "TYPE_REJECT",
            Self::Transfer => "TYPE_TRANSFER",
            Self::Message => "TYPE_MESSAGE",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = BtpError;

    fn try_from(value: u8) -> Result<Self, BtpError> {
        Self::from_u8(value).ok_or(BtpError::UnknownPacketType(value))
    }
}

/// Declared encoding of a sub-protocol payload. Unrecognised wire values are
/// read as `Binary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ContentType {
    Binary,
    Utf8Text,
    Json,
}

impl From<u8> for ContentType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Utf8Text,
            2 => Self::Json,
            _ => Self::Binary,
        }
    }
}

impl From<ContentType> for u8 {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Binary => 0,
            ContentType::Utf8Text => 1,
            ContentType::Json => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubProtocol {
    pub protocol_name: String,
    pub content_type: ContentType,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl SubProtocol {
    pub fn new(name: impl Into<String>, content_type: ContentType, data: impl Into<Bytes>) -> Self {
        Self {
            protocol_name: name.into(),
            content_type,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtpErrorInfo {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub triggered_at: String,
    #[serde(default)]
    pub data: String,
}

impl BtpErrorInfo {
    pub fn new(code: &str, name: &str, data: impl Into<String>) -> Self {
        let triggered_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            code: code.to_string(),
            name: name.to_string(),
            triggered_at,
            data: data.into(),
        }
    }

    /// Error body sent back to a peer whose packet could not be served.
    /// Handler and decode details stay local.
    pub fn for_dispatch_error(err: &BtpError) -> Self {
        match err {
            BtpError::UnsupportedPacketType(_) => {
                Self::new("F00", "NotAcceptedError", "unsupported btp packet")
            }
            BtpError::UnknownPacketType(_) => {
                Self::new("F01", "InvalidFieldsError", "unknown btp packet type")
            }
            BtpError::NoHandlerRegistered => {
                Self::new("T00", "UnreachableError", "no request handler registered")
            }
            _ => Self::new("T00", "UnreachableError", "error handling btp packet"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtpPacketData {
    #[serde(default)]
    pub protocol_data: Vec<SubProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Error envelopes carry `code`, `name`, `triggeredAt` and `data` next
    /// to `protocolData` rather than in a nested object.
    #[serde(flatten)]
    pub error: Option<BtpErrorInfo>,
}

impl BtpPacketData {
    pub fn with_protocols(protocol_data: Vec<SubProtocol>) -> Self {
        Self {
            protocol_data,
            ..Self::default()
        }
    }

    pub fn protocol(&self, name: &str) -> Option<&SubProtocol> {
        self.protocol_data.iter().find(|p| p.protocol_name == name)
    }
}

/// One BTP envelope. The type byte is kept raw so that values outside
/// [`MessageType`] can still be received and answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtpPacket {
    pub request_id: u32,
    #[serde(rename = "type")]
    pub packet_type: u8,
    #[serde(default)]
    pub data: BtpPacketData,
}

impl BtpPacket {
    pub fn new(request_id: u32, message_type: MessageType, data: BtpPacketData) -> Self {
        Self {
            request_id,
            packet_type: message_type.as_u8(),
            data,
        }
    }

    pub fn message(request_id: u32, protocol_data: Vec<SubProtocol>) -> Self {
        Self::new(
            request_id,
            MessageType::Message,
            BtpPacketData::with_protocols(protocol_data),
        )
    }

    pub fn response(request_id: u32, protocol_data: Vec<SubProtocol>) -> Self {
        Self::new(
            request_id,
            MessageType::Response,
            BtpPacketData::with_protocols(protocol_data),
        )
    }

    pub fn error(request_id: u32, info: BtpErrorInfo) -> Self {
        Self::new(
            request_id,
            MessageType::Error,
            BtpPacketData {
                error: Some(info),
                ..BtpPacketData::default()
            },
        )
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.packet_type)
    }

    pub fn type_name(&self) -> String {
        match self.message_type() {
            Some(kind) => kind.as_str().to_string(),
            None => format!("UNKNOWN({})", self.packet_type),
        }
    }
}

pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
