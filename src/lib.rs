//! hfile library
//!
//! Single-file transfer over plain TCP: a 2-byte big-endian filename length,
//! the filename, then the file body until the sender closes the connection.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod logger;
#[cfg(feature = "async")]
pub mod net_async;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stream_io;
pub mod transport;

pub use error::{Result, TransferError};
