//! Typed error taxonomy for the FRFTP engine.

use thiserror::Error;

/// Errors the sender/receiver engines can produce.
///
/// Fatal variants abort the event loop; [`FrftpError::MalformedFrame`] is
/// produced only for callers that want to count/log drops; the engines
/// themselves swallow malformed frames internally and never return this
/// variant from the hot path.
#[derive(Debug, Error)]
pub enum FrftpError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("handshake failed after {retries} attempts")]
    HandshakeFailed { retries: u32 },

    #[error("segment {0} exhausted its retry budget without acknowledgment")]
    RetriesExhausted(u32),

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("size mismatch: expected {expected} bytes, received {received}")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("transfer cancelled")]
    Cancelled,
}

impl FrftpError {
    /// Process exit code per the external interface contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            FrftpError::InvalidConfig(_) => 2,
            FrftpError::IoError(_) => 1,
            FrftpError::HandshakeFailed { .. }
            | FrftpError::RetriesExhausted(_)
            | FrftpError::SizeMismatch { .. }
            | FrftpError::Cancelled => 1,
            FrftpError::MalformedFrame(_) => 1,
        }
    }
}
