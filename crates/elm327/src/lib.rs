//! ELM327 AT-Command Protocol Client
//!
//! This crate speaks the textual AT-command protocol of ELM327-compatible
//! OBD-II adapters over any byte channel: it performs the session handshake,
//! discovers which PIDs the vehicle supports by walking the Mode-01 support
//! bitmaps, and decodes raw hex payloads into physical sensor values.
//!
//! The engine is transport-agnostic — [`Session`] is generic over
//! `AsyncRead + AsyncWrite`, so it runs equally over a
//! `tokio_serial::SerialStream` and over the in-memory mock adapter behind
//! the `mock` feature.
//! Opening and configuring the device is the caller's responsibility.

mod bitmap;
mod error;
mod frame;
mod pid;
mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bitmap::extract_pids;
pub use error::ObdError;
pub use frame::{parse_mode1, trim_prompt};
pub use pid::{Pid, Reading};
pub use session::{Session, SessionConfig};
