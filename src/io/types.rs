// src/io/types.rs
//
// Messages passed from a reader task to the presentation side.

use tokio::sync::mpsc;

use super::error::IoError;
use super::serial::framer::DecodedEvent;

// ============================================================================
// Source Messages
// ============================================================================

/// Why a stream stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEndReason {
    /// A finite source (capture file) was read to the end
    Complete,
    /// The device went away (EOF on the port)
    Disconnected,
    /// A read failed
    Error,
    /// The caller cancelled the reader
    Stopped,
}

impl StreamEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEndReason::Complete => "complete",
            StreamEndReason::Disconnected => "disconnected",
            StreamEndReason::Error => "error",
            StreamEndReason::Stopped => "stopped",
        }
    }
}

/// Message from a reader to whoever presents its output
#[derive(Debug)]
pub enum SimEvent {
    /// Source opened (source name, human readable detail)
    Connected(String, String),
    /// Output of the line/frame decoder
    Decoded(DecodedEvent),
    /// Transport failure; the stream ends right after
    Error(IoError),
    /// Stream ended (source name, reason)
    Ended(String, StreamEndReason),
}

/// Sender half handed to readers
pub type EventSender = mpsc::UnboundedSender<SimEvent>;

/// Receiver half owned by the presentation loop
pub type EventReceiver = mpsc::UnboundedReceiver<SimEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
