// src/io/serial/framer.rs
//
// Line/frame decoder for the display controller's serial stream.
// Text log lines are newline-terminated; a marker line switches the stream
// into a fixed-length binary framebuffer that is byte-counted, never scanned.

use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Marker line that announces a framebuffer
pub const IMAGE_MARKER: &str = "IMG_START";

/// Native panel width in pixels
pub const DISPLAY_WIDTH: usize = 800;

/// Native panel height in pixels
pub const DISPLAY_HEIGHT: usize = 480;

/// Default cap on an unterminated text segment before it is force-split
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

const LINE_TERMINATOR: u8 = b'\n';

// =============================================================================
// Types
// =============================================================================

/// Display dimensions shared by the decoder and the unpacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    width: usize,
    height: usize,
}

/// Rejected display dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryError {
    pub width: usize,
    pub height: usize,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid display geometry {}x{}: pixel count must be non-zero and a multiple of 8",
            self.width, self.height
        )
    }
}

impl std::error::Error for GeometryError {}

impl FrameGeometry {
    pub fn new(width: usize, height: usize) -> Result<Self, GeometryError> {
        match width.checked_mul(height) {
            Some(pixels) if pixels > 0 && pixels % 8 == 0 => Ok(FrameGeometry { width, height }),
            _ => Err(GeometryError { width, height }),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Packed payload size in bytes (one bit per pixel)
    pub fn frame_len(&self) -> usize {
        self.width * self.height / 8
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        FrameGeometry {
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
        }
    }
}

/// What the decoder is currently doing with incoming bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderMode {
    /// Accumulating a text line up to the next terminator
    Text,
    /// Counting raw framebuffer bytes; content is never interpreted
    AwaitingImageBytes { remaining: usize },
}

/// Recoverable decode failures. The decoder stays usable after any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A line segment was not valid UTF-8 and was discarded
    InvalidEncoding { bytes: Vec<u8> },
    /// The stream ended (or went quiet) before a framebuffer was complete
    TruncatedFrame { received: usize, expected: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidEncoding { bytes } => write!(
                f,
                "Received non-UTF8 data ({} bytes): {}",
                bytes.len(),
                hex::encode(bytes)
            ),
            DecodeError::TruncatedFrame { received, expected } => write!(
                f,
                "Error: Incomplete image data received ({} of {} bytes)",
                received, expected
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// One unit of decoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    LogLine(String),
    ImageFrame {
        payload: Vec<u8>,
        width: usize,
        height: usize,
    },
    DecodeError(DecodeError),
}

// =============================================================================
// Decoder
// =============================================================================

/// Stateful decoder for one connection.
///
/// Chunk boundaries are invisible: feeding a stream one byte at a time or all
/// at once yields the same events. Never blocks and holds no global state.
#[derive(Debug)]
pub struct LineFrameDecoder {
    geometry: FrameGeometry,
    marker: String,
    max_line_length: usize,
    mode: DecoderMode,
    line: Vec<u8>,
    /// The pending line continues one that was force-split
    continuation: bool,
    payload: Vec<u8>,
}

impl LineFrameDecoder {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self::with_options(geometry, IMAGE_MARKER, DEFAULT_MAX_LINE_LENGTH)
    }

    /// `max_line_length` is clamped to at least 1 byte.
    pub fn with_options(geometry: FrameGeometry, marker: &str, max_line_length: usize) -> Self {
        LineFrameDecoder {
            geometry,
            marker: marker.to_string(),
            max_line_length: max_line_length.max(1),
            mode: DecoderMode::Text,
            line: Vec::new(),
            continuation: false,
            payload: Vec::new(),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn mode(&self) -> DecoderMode {
        self.mode
    }

    pub fn is_awaiting_image(&self) -> bool {
        matches!(self.mode, DecoderMode::AwaitingImageBytes { .. })
    }

    /// Bytes of an unterminated text line held over from earlier chunks
    pub fn pending_line_len(&self) -> usize {
        self.line.len()
    }

    /// Feed a chunk of raw bytes.
    /// Returns every event completed by this chunk, in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            match self.mode {
                DecoderMode::AwaitingImageBytes { remaining } => {
                    let take = remaining.min(rest.len());
                    self.payload.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];

                    let remaining = remaining - take;
                    if remaining == 0 {
                        self.mode = DecoderMode::Text;
                        events.push(DecodedEvent::ImageFrame {
                            payload: std::mem::take(&mut self.payload),
                            width: self.geometry.width,
                            height: self.geometry.height,
                        });
                    } else {
                        self.mode = DecoderMode::AwaitingImageBytes { remaining };
                    }
                }
                DecoderMode::Text => {
                    // line.len() < max_line_length holds between iterations
                    let room = self.max_line_length - self.line.len();
                    let window = &rest[..rest.len().min(room)];

                    match window.iter().position(|&b| b == LINE_TERMINATOR) {
                        Some(pos) => {
                            self.line.extend_from_slice(&window[..pos]);
                            rest = &rest[pos + 1..];
                            events.extend(self.end_line());
                        }
                        None => {
                            self.line.extend_from_slice(window);
                            rest = &rest[window.len()..];
                            if self.line.len() >= self.max_line_length {
                                events.push(self.split_line());
                            }
                        }
                    }
                }
            }
        }

        events
    }

    /// Signal a terminal read (end of stream, or a read timeout with no data).
    /// Abandons an in-flight framebuffer and reports it; a partial text line is kept.
    pub fn finish(&mut self) -> Option<DecodedEvent> {
        match self.mode {
            DecoderMode::Text => None,
            DecoderMode::AwaitingImageBytes { .. } => {
                let received = self.payload.len();
                self.payload.clear();
                self.mode = DecoderMode::Text;
                Some(DecodedEvent::DecodeError(DecodeError::TruncatedFrame {
                    received,
                    expected: self.geometry.frame_len(),
                }))
            }
        }
    }

    /// Drop all buffered state, e.g. before reusing the decoder on a new connection.
    pub fn reset(&mut self) {
        self.mode = DecoderMode::Text;
        self.line.clear();
        self.continuation = false;
        self.payload.clear();
    }

    /// A `\n` arrived: emit the line, or enter image mode on a marker.
    /// Only a line that started after a real terminator can be a marker.
    fn end_line(&mut self) -> Option<DecodedEvent> {
        let mut raw = std::mem::take(&mut self.line);
        let continuation = std::mem::replace(&mut self.continuation, false);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        if continuation {
            // Terminator right after a forced split ends that split
            return if raw.is_empty() { None } else { Some(text_event(raw)) };
        }

        if raw.starts_with(self.marker.as_bytes()) && std::str::from_utf8(&raw).is_ok() {
            let frame_len = self.geometry.frame_len();
            self.payload.reserve(frame_len);
            self.mode = DecoderMode::AwaitingImageBytes {
                remaining: frame_len,
            };
            return None;
        }

        Some(text_event(raw))
    }

    /// The line reached `max_line_length` without a terminator. Emit it up to
    /// the last complete UTF-8 character (a trailing `\r` waits too) and carry
    /// the rest into a continuation line.
    fn split_line(&mut self) -> DecodedEvent {
        let mut cut = utf8_cut(&self.line);
        if cut > 1 && self.line[cut - 1] == b'\r' {
            cut -= 1;
        }

        let carry = self.line.split_off(cut);
        let fragment = std::mem::replace(&mut self.line, carry);
        self.continuation = true;
        text_event(fragment)
    }
}

fn text_event(raw: Vec<u8>) -> DecodedEvent {
    match String::from_utf8(raw) {
        Ok(text) => DecodedEvent::LogLine(text),
        Err(e) => DecodedEvent::DecodeError(DecodeError::InvalidEncoding {
            bytes: e.into_bytes(),
        }),
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
/// Never returns 0 for non-empty input, so a split always makes progress.
fn utf8_cut(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let b = bytes[len - back];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        if width > back && back < len {
            return len - back;
        }
        break;
    }
    len
}
