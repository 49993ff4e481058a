// src/io/mod.rs
//
// Byte sources for the simulator: a live serial port or a captured byte file.
// Both run the same blocking read/decode loop on a dedicated thread and report
// through a channel, so the presentation side never waits on a read.

mod error;
mod replay;
pub mod serial;
mod types;

pub use error::IoError;
pub use replay::{ReplayConfig, ReplayReader};
pub use serial::framer::{
    DecodeError, DecodedEvent, DecoderMode, FrameGeometry, GeometryError, LineFrameDecoder,
};
pub use serial::{LineSettings, Parity, SerialConfig, SerialReader};
pub use types::{event_channel, EventReceiver, EventSender, SimEvent, StreamEndReason};

use async_trait::async_trait;

// ============================================================================
// Shared Types
// ============================================================================

/// Current state of a reader
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IOState {
    Stopped,
    Starting,
    Running,
}

// ============================================================================
// IO Device Trait
// ============================================================================

/// A byte source that feeds one decoder and reports through an [`EventSender`].
#[async_trait]
pub trait IODevice: Send + Sync {
    /// Start streaming
    async fn start(&mut self) -> Result<(), String>;

    /// Stop streaming and wait for the reader thread to exit
    async fn stop(&mut self) -> Result<(), String>;

    /// Get current state
    fn state(&self) -> IOState;

    /// Name shown in the log pane (port path or file name)
    fn source_name(&self) -> &str;

    /// Device type identifier (e.g., "serial", "replay")
    fn device_type(&self) -> &'static str {
        "unknown"
    }
}
