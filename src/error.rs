//! Error types for DC310S communications and stores.

use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Dc310sError>;

// Define custom errors for better context
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum Dc310sError {
    #[error("Failed to open serial port: {0}")]
    Connect(#[from] serialport::Error),
    #[error("Write failed: {0}")]
    Write(io::Error),
    #[error("No reply within the read timeout")]
    ReadTimeout,
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("Failed to parse reply as a number: {0:?}")]
    Parse(String),
    #[error("Received invalid UTF-8 data from device: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Not connected to a device")]
    NotConnected,
    #[error("Store I/O error: {0}")]
    StoreIo(io::Error),
    #[error("Store format error: {0}")]
    StoreFormat(#[from] serde_json::Error),
}

impl From<io::Error> for Dc310sError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            Dc310sError::ReadTimeout
        } else {
            Dc310sError::Io(err)
        }
    }
}
