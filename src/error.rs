use thiserror::Error;

#[derive(Debug, Error)]
pub enum BtpError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unsupported btp packet type: {0}")]
    UnsupportedPacketType(u8),
    #[error("unknown btp packet type: {0}")]
    UnknownPacketType(u8),
    #[error("no request handler registered")]
    NoHandlerRegistered,
    #[error("data handler failed: {0}")]
    HandlerFailure(String),
    #[error("request {0} timed out")]
    Timeout(u32),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("write failed: {0}")]
    WriteFailure(String),
    #[error("no stream for peer {0}")]
    PeerNotFound(String),
    #[error("request id {0} is already pending")]
    DuplicateRequestId(u32),
    #[error("peer replied with error {code} {name}: {data}")]
    Remote {
        code: String,
        name: String,
        data: String,
    },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<std::io::Error> for BtpError {
    fn from(err: std::io::Error) -> Self {
        BtpError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BtpError>;
