pub mod client;
pub mod config;
pub mod domains;
pub mod error;
pub mod interfaces;
pub mod protocol_data;
pub mod services;

pub use crate::client::{BtpTunnel, Handlers};
pub use crate::config::Config;
pub use crate::domains::frame::AccountDescriptor;
pub use crate::domains::message::{BtpPacket, BtpPacketData, ContentType, MessageType, SubProtocol};
pub use crate::error::{BtpError, Result};
pub use crate::interfaces::handlers::{data_handler_fn, AccountHooks, DataHandler};
pub use crate::protocol_data::{decode_protocol_data, encode_protocol_data, ProtocolMap, ProtocolValue};
pub use crate::services::session::{Role, SessionEngine};
