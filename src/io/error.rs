// src/io/error.rs
//
// Error type shared by the byte sources (serial port, capture replay).

use std::fmt;

/// Errors raised while opening or reading a byte source.
/// Each variant names the device so messages stay readable in the log pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    /// Could not open or connect to the device
    Connection { device: String, message: String },
    /// A read from an open device failed
    Read { device: String, message: String },
    /// Invalid settings for the device
    Config { device: String, message: String },
}

impl IoError {
    pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn read(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Read {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn config(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Config {
            device: device.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Connection { device, message } => {
                write!(f, "Failed to open {}: {}", device, message)
            }
            IoError::Read { device, message } => write!(f, "{}: read error: {}", device, message),
            IoError::Config { device, message } => {
                write!(f, "{}: invalid configuration: {}", device, message)
            }
        }
    }
}

impl std::error::Error for IoError {}

impl From<IoError> for String {
    fn from(e: IoError) -> Self {
        e.to_string()
    }
}
