//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// I/O failure on the underlying channel
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The adapter never produced its `>` prompt within the configured window
    #[error("timed out waiting for adapter prompt after {0}ms")]
    PromptTimeout(u64),

    /// Response does not match the expected Mode-01 echo shape
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A byte expected to be an ASCII hex digit is not
    #[error("invalid hex digit 0x{0:02X} in adapter output")]
    InvalidHex(u8),

    /// PID not announced in the vehicle's support bitmaps
    #[error("PID {0:02X} not supported by vehicle")]
    PidNotSupported(u8),
}
