// tests/decode_pipeline.rs
//
// Drives the blocking read loop with in-memory sources and routes its output
// into a recording sink, the same path the terminal UI and headless mode use.

use std::collections::VecDeque;
use std::io::{self, Cursor, ErrorKind, Read};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use glance_sim_lib::framebuffer::PixelGrid;
use glance_sim_lib::io::serial::{run_decode_loop, DecodeLoopOptions};
use glance_sim_lib::io::{FrameGeometry, LineFrameDecoder, SimEvent, StreamEndReason};
use glance_sim_lib::sink::{route_sim_event, DisplaySink};

#[derive(Default)]
struct RecordingSink {
    lines: Vec<String>,
    images: Vec<PixelGrid>,
}

impl DisplaySink for RecordingSink {
    fn log_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn show_image(&mut self, grid: &PixelGrid) {
        self.images.push(grid.clone());
    }
}

/// Returns scripted reads, then end-of-stream
struct ScriptedSource {
    steps: VecDeque<io::Result<Vec<u8>>>,
}

impl ScriptedSource {
    fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
        ScriptedSource { steps: steps.into() }
    }
}

impl Read for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.steps.push_front(Ok(data[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }
}

fn options(chunk_size: usize, frame_timeout: Duration) -> DecodeLoopOptions {
    DecodeLoopOptions {
        source_name: "test".to_string(),
        frame_timeout,
        eof_reason: StreamEndReason::Disconnected,
        chunk_size,
        pace_baud: None,
    }
}

/// Run the loop and route every event, returning the end reason
fn pump<R: Read>(
    source: &mut R,
    geometry: FrameGeometry,
    options: &DecodeLoopOptions,
    sink: &mut RecordingSink,
) -> StreamEndReason {
    let mut decoder = LineFrameDecoder::new(geometry);
    let cancel = AtomicBool::new(false);
    let mut events = Vec::new();
    let reason = run_decode_loop(source, &mut decoder, options, &cancel, None, |e| events.push(e));
    for event in events {
        route_sim_event(event, sink);
    }
    reason
}

#[test]
fn test_boot_log_then_framebuffer() {
    // 16x2 panel: 4 payload bytes
    let geometry = FrameGeometry::new(16, 2).unwrap();
    let mut stream = b"I (12) boot: ESP-IDF v5.1\r\nwifi ready\nIMG_START\n".to_vec();
    // Payload contains a newline and the marker prefix; both are pixels
    stream.extend_from_slice(&[0x0A, b'I', 0xFF, 0x00]);
    stream.extend_from_slice(b"refresh done\n");

    let mut sink = RecordingSink::default();
    let reason = pump(&mut Cursor::new(stream), geometry, &options(5, Duration::from_secs(1)), &mut sink);

    assert_eq!(reason, StreamEndReason::Disconnected);
    assert_eq!(
        sink.lines,
        vec![
            "I (12) boot: ESP-IDF v5.1",
            "wifi ready",
            "Received image data, updating display...",
            "refresh done",
        ]
    );
    assert_eq!(sink.images.len(), 1);

    let grid = &sink.images[0];
    assert_eq!((grid.width(), grid.height()), (16, 2));
    // 0x0A = 0000_1010: bit 0 is dark
    assert!(grid.is_dark(0, 0));
    assert!(!grid.is_dark(4, 0));
    assert!(!grid.is_dark(6, 0));
    // Second row: 0xFF light, 0x00 dark
    assert!(!grid.is_dark(0, 1));
    assert!(grid.is_dark(8, 1));
}

#[test]
fn test_stream_end_mid_frame_reports_truncation() {
    let geometry = FrameGeometry::new(8, 8).unwrap();
    let mut sink = RecordingSink::default();
    let mut source = Cursor::new(b"IMG_START\n\x01\x02\x03".to_vec());

    pump(&mut source, geometry, &options(64, Duration::from_secs(1)), &mut sink);

    assert!(sink.images.is_empty());
    assert_eq!(
        sink.lines,
        vec!["Error: Incomplete image data received (3 of 8 bytes)"]
    );
}

#[test]
fn test_silence_mid_frame_abandons_frame_and_resumes_text() {
    let geometry = FrameGeometry::new(8, 4).unwrap();
    let mut source = ScriptedSource::new(vec![
        Ok(b"IMG_START\n\xAA".to_vec()),
        Err(io::Error::new(ErrorKind::TimedOut, "poll")),
        Ok(b"controller reset\n".to_vec()),
    ]);

    let mut sink = RecordingSink::default();
    pump(&mut source, geometry, &options(64, Duration::ZERO), &mut sink);

    assert!(sink.images.is_empty());
    assert_eq!(
        sink.lines,
        vec![
            "Error: Incomplete image data received (1 of 4 bytes)",
            "controller reset",
        ]
    );
}

#[test]
fn test_invalid_utf8_is_reported_and_decoding_continues() {
    let geometry = FrameGeometry::new(8, 1).unwrap();
    let mut sink = RecordingSink::default();
    let mut source = Cursor::new(b"\xFF\xFEgarbage\nok\n".to_vec());

    pump(&mut source, geometry, &options(3, Duration::from_secs(1)), &mut sink);

    assert_eq!(sink.lines.len(), 2);
    assert!(sink.lines[0].starts_with("Received non-UTF8 data"));
    assert_eq!(sink.lines[1], "ok");
}

#[test]
fn test_read_error_ends_stream() {
    let geometry = FrameGeometry::new(8, 1).unwrap();
    let mut source = ScriptedSource::new(vec![
        Ok(b"hello\n".to_vec()),
        Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged")),
    ]);

    let mut decoder = LineFrameDecoder::new(geometry);
    let cancel = AtomicBool::new(false);
    let mut events = Vec::new();
    let reason = run_decode_loop(
        &mut source,
        &mut decoder,
        &options(16, Duration::from_secs(1)),
        &cancel,
        None,
        |e| events.push(e),
    );

    assert_eq!(reason, StreamEndReason::Error);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], SimEvent::Error(_)));
}
