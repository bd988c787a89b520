//! ## USBTMC Errors
//!
//! The errors used throughout the crate.
//!
//! The transport engine keeps the full taxonomy internally. Its boundary
//! (`Session::write`, `Session::read`, `Session::ask`) narrows every variant
//! to a zero-length result.
//!

/// Failure reported by the underlying USB transfer primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("transfer timed out")]
    Timeout,
    #[error("endpoint stalled")]
    Stall,
    #[error("device disconnected")]
    Disconnected,
    #[error("transfer failed: {0}")]
    Other(String),
}

impl From<rusb::Error> for TransferError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => TransferError::Timeout,
            rusb::Error::Pipe => TransferError::Stall,
            rusb::Error::NoDevice => TransferError::Disconnected,
            other => TransferError::Other(other.to_string()),
        }
    }
}

/// A DEV_DEP_MSG_IN header that does not answer the request that was sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("unexpected message id {found}, expected {expected}")]
    UnexpectedMsgId { found: u8, expected: u8 },
    #[error("bad tag {tag:#04x} with inverse {inverse:#04x}, expected {expected:#04x}")]
    TagMismatch { tag: u8, inverse: u8, expected: u8 },
    #[error("transfer size {size} larger than requested {requested}")]
    SizeExceedsRequest { size: usize, requested: usize },
    #[error("transfer size {size} larger than remaining buffer {remaining}")]
    SizeExceedsBuffer { size: usize, remaining: usize },
    #[error("received {received} bytes, header indicated {expected}")]
    ShortTransfer { received: usize, expected: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("device not found")]
    DeviceNotFound,
    #[error("device is not compatible with USBTMC")]
    DeviceIncompatible,
    #[error("specified interface not found")]
    InterfaceNotFound,
    #[error("specified interface setting not found")]
    InterfaceSettingNotFound,
    #[error("bulk out endpoint not found")]
    BulkOutEndpointNotFound,
    #[error("bulk in endpoint not found")]
    BulkInEndpointNotFound,
    #[error("session is not ready")]
    NotReady,
    #[error("message size {len} exceeds max packet size {max}; multi-packet transfers are not supported")]
    TooLarge { len: usize, max: usize },
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("transfer timed out")]
    Timeout,
    #[error("transfer error: {0}")]
    Transport(TransferError),
    #[error("control request returned status {0:#04x}")]
    Status(u8),
}

impl From<TransferError> for Error {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Timeout => Error::Timeout,
            other => Error::Transport(other),
        }
    }
}

/// Failures of the instrument abstraction layer.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error(transparent)]
    Transport(#[from] Error),
    #[error("only {written} of {expected} command bytes written")]
    ShortWrite { written: usize, expected: usize },
    #[error("response is not valid text")]
    NotText,
    #[error("expected {expected} fields in response, found {found}")]
    TokenCount { expected: usize, found: usize },
    #[error("unrecognized response token '{0}'")]
    UnrecognizedToken(String),
}
