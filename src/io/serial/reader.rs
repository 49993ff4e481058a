// src/io/serial/reader.rs
//
// Serial port reader for the display controller.
// Runs a blocking read loop on a dedicated thread, feeds every chunk through a
// LineFrameDecoder and forwards the decoded events over a channel.

use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::framer::{FrameGeometry, LineFrameDecoder, DEFAULT_MAX_LINE_LENGTH, IMAGE_MARKER};
use super::utils::LineSettings;
use crate::io::{EventSender, IODevice, IOState, IoError, SimEvent, StreamEndReason};

/// Port read timeout. Short so cancellation is noticed quickly; the frame
/// timeout below decides when silence actually aborts a framebuffer.
const SERIAL_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Read buffer size for the serial port
const SERIAL_CHUNK_SIZE: usize = 4096;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Serial port configuration
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub port: String,
    pub line: LineSettings,
    pub geometry: FrameGeometry,
    pub marker: String,
    pub max_line_length: usize,
    /// Silence while receiving a framebuffer before it is declared truncated
    pub frame_timeout: Duration,
    /// Tee every received byte into this file (replayable later)
    pub capture_path: Option<PathBuf>,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        SerialConfig {
            port: port.into(),
            line: LineSettings::default(),
            geometry: FrameGeometry::default(),
            marker: IMAGE_MARKER.to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            frame_timeout: Duration::from_secs(1),
            capture_path: None,
        }
    }
}

/// Knobs for [`run_decode_loop`]
#[derive(Clone, Debug)]
pub struct DecodeLoopOptions {
    /// Device name used in log and error messages
    pub source_name: String,
    /// Silence while a framebuffer is pending before it is abandoned
    pub frame_timeout: Duration,
    /// Reason reported when the source returns end-of-stream
    pub eof_reason: StreamEndReason,
    pub chunk_size: usize,
    /// Emulate wire speed by sleeping 10 bit-times per byte
    pub pace_baud: Option<u32>,
}

// ============================================================================
// Decode Loop
// ============================================================================

/// Read `source` until end-of-stream, error or cancellation, feeding the decoder.
///
/// A read timeout with no data while a framebuffer is pending counts as a
/// terminal read once `frame_timeout` has elapsed since the last byte. Any
/// frame still pending when the loop exits is reported as truncated.
pub fn run_decode_loop<R, F>(
    source: &mut R,
    decoder: &mut LineFrameDecoder,
    options: &DecodeLoopOptions,
    cancel_flag: &AtomicBool,
    mut capture: Option<&mut dyn Write>,
    mut emit: F,
) -> StreamEndReason
where
    R: Read + ?Sized,
    F: FnMut(SimEvent),
{
    let mut buf = vec![0u8; options.chunk_size.max(1)];
    let mut last_data = Instant::now();

    let reason = loop {
        if cancel_flag.load(Ordering::Relaxed) {
            break StreamEndReason::Stopped;
        }

        match source.read(&mut buf) {
            Ok(0) => break options.eof_reason,
            Ok(n) => {
                last_data = Instant::now();
                let chunk = &buf[..n];

                let mut capture_failed = false;
                if let Some(writer) = capture.as_mut() {
                    if let Err(e) = writer.write_all(chunk) {
                        tlog!("[{}] Capture write failed, capture disabled: {}", options.source_name, e);
                        capture_failed = true;
                    }
                }
                if capture_failed {
                    capture = None;
                }

                for event in decoder.feed(chunk) {
                    emit(SimEvent::Decoded(event));
                }

                if let Some(baud) = options.pace_baud.filter(|&b| b > 0) {
                    std::thread::sleep(Duration::from_secs_f64(n as f64 * 10.0 / baud as f64));
                }
            }
            // No bytes within the poll window
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                if decoder.is_awaiting_image() && last_data.elapsed() >= options.frame_timeout {
                    if let Some(event) = decoder.finish() {
                        tlog!("[{}] Framebuffer timed out: {:?}", options.source_name, event);
                        emit(SimEvent::Decoded(event));
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                emit(SimEvent::Error(IoError::read(&options.source_name, e.to_string())));
                break StreamEndReason::Error;
            }
        }
    };

    if let Some(event) = decoder.finish() {
        emit(SimEvent::Decoded(event));
    }
    if let Some(writer) = capture {
        if let Err(e) = writer.flush() {
            tlog!("[{}] Capture flush failed: {}", options.source_name, e);
        }
    }

    reason
}

/// Run a blocking stream job on its own thread and report a panic as a stream end.
pub(crate) fn spawn_stream<F>(
    log_prefix: &'static str,
    source_name: String,
    events: EventSender,
    job: F,
) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(job).await;

        if let Err(e) = result {
            tlog!("[{}] Task panicked: {:?}", log_prefix, e);
            let _ = events.send(SimEvent::Ended(source_name, StreamEndReason::Error));
        }
    })
}

// ============================================================================
// Serial Reader
// ============================================================================

/// Serial port reader implementing IODevice
pub struct SerialReader {
    config: SerialConfig,
    events: EventSender,
    state: IOState,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
}

impl SerialReader {
    pub fn new(config: SerialConfig, events: EventSender) -> Self {
        Self {
            config,
            events,
            state: IOState::Stopped,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
        }
    }
}

#[async_trait]
impl IODevice for SerialReader {
    async fn start(&mut self) -> Result<(), String> {
        if self.state == IOState::Running {
            return Err("Reader is already running".to_string());
        }

        self.state = IOState::Starting;
        self.cancel_flag.store(false, Ordering::Relaxed);

        let config = self.config.clone();
        let cancel_flag = self.cancel_flag.clone();
        let events = self.events.clone();

        let handle = spawn_stream("Serial", self.config.port.clone(), self.events.clone(), move || {
            run_serial_stream_blocking(config, cancel_flag, events)
        });
        self.task_handle = Some(handle);
        self.state = IOState::Running;

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), String> {
        self.cancel_flag.store(true, Ordering::Relaxed);

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| format!("Failed to join serial reader: {}", e))?;
        }

        self.state = IOState::Stopped;
        Ok(())
    }

    fn state(&self) -> IOState {
        match &self.task_handle {
            Some(handle) if handle.is_finished() => IOState::Stopped,
            _ => self.state.clone(),
        }
    }

    fn source_name(&self) -> &str {
        &self.config.port
    }

    fn device_type(&self) -> &'static str {
        "serial"
    }
}

/// Blocking serial stream: open, decode until the loop ends, report why.
fn run_serial_stream_blocking(config: SerialConfig, cancel_flag: Arc<AtomicBool>, events: EventSender) {
    let fail = |err: IoError| {
        tlog!("[Serial:{}] {}", config.port, err);
        let _ = events.send(SimEvent::Error(err));
        let _ = events.send(SimEvent::Ended(config.port.clone(), StreamEndReason::Error));
    };

    let builder = match config.line.to_builder(&config.port, SERIAL_POLL_TIMEOUT) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    let mut port = match builder.open() {
        Ok(p) => p,
        Err(e) => return fail(IoError::connection(&config.port, e.to_string())),
    };

    let mut capture = match &config.capture_path {
        Some(path) => match File::create(path) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                return fail(IoError::config(
                    &config.port,
                    format!("cannot create capture file {}: {}", path.display(), e),
                ))
            }
        },
        None => None,
    };

    tlog!(
        "[Serial:{}] Opened at {} [frame: {}x{}, marker: {:?}, capture: {}]",
        config.port,
        config.line.describe(),
        config.geometry.width(),
        config.geometry.height(),
        config.marker,
        config
            .capture_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "off".to_string())
    );

    let _ = events.send(SimEvent::Connected(
        config.port.clone(),
        format!("Connected to {} at {} bps.", config.port, config.line.baud_rate),
    ));

    // One decoder per connection, dropped when the port closes
    let mut decoder = LineFrameDecoder::with_options(config.geometry, &config.marker, config.max_line_length);
    let options = DecodeLoopOptions {
        source_name: format!("Serial:{}", config.port),
        frame_timeout: config.frame_timeout,
        eof_reason: StreamEndReason::Disconnected,
        chunk_size: SERIAL_CHUNK_SIZE,
        pace_baud: None,
    };

    let reason = run_decode_loop(
        &mut port,
        &mut decoder,
        &options,
        &cancel_flag,
        capture.as_mut().map(|w| w as &mut dyn Write),
        |event| {
            let _ = events.send(event);
        },
    );

    tlog!("[Serial:{}] Stream ended ({})", config.port, reason.as_str());
    let _ = events.send(SimEvent::Ended(config.port.clone(), reason));
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{DecodeError, DecodedEvent};
    use std::collections::VecDeque;
    use std::io;

    /// Reader that replays a script of read results, then reports EOF
    struct ScriptedSource {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            ScriptedSource { script: script.into() }
        }
    }

    impl Read for ScriptedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.script.push_front(Ok(bytes[n..].to_vec()));
                    }
                    Ok(n)
                }
            }
        }
    }

    fn options(frame_timeout: Duration) -> DecodeLoopOptions {
        DecodeLoopOptions {
            source_name: "test".to_string(),
            frame_timeout,
            eof_reason: StreamEndReason::Disconnected,
            chunk_size: 3,
            pace_baud: None,
        }
    }

    fn collect(
        source: &mut ScriptedSource,
        geometry: FrameGeometry,
        options: &DecodeLoopOptions,
        capture: Option<&mut dyn Write>,
    ) -> (Vec<SimEvent>, StreamEndReason) {
        let mut decoder = LineFrameDecoder::new(geometry);
        let cancel = AtomicBool::new(false);
        let mut events = Vec::new();
        let reason = run_decode_loop(source, &mut decoder, options, &cancel, capture, |e| events.push(e));
        (events, reason)
    }

    fn decoded(events: Vec<SimEvent>) -> Vec<DecodedEvent> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::Decoded(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_loop_decodes_until_eof() {
        let mut source = ScriptedSource::new(vec![Ok(b"hello\nIMG_START\n\x7f".to_vec())]);
        let geometry = FrameGeometry::new(8, 1).unwrap();

        let (events, reason) = collect(&mut source, geometry, &options(Duration::from_secs(1)), None);

        assert_eq!(reason, StreamEndReason::Disconnected);
        assert_eq!(
            decoded(events),
            vec![
                DecodedEvent::LogLine("hello".to_string()),
                DecodedEvent::ImageFrame { payload: vec![0x7F], width: 8, height: 1 },
            ]
        );
    }

    #[test]
    fn test_timeout_mid_frame_truncates() {
        let mut source = ScriptedSource::new(vec![
            Ok(b"IMG_START\n\x01\x02".to_vec()),
            Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
            Ok(b"next\n".to_vec()),
        ]);
        let geometry = FrameGeometry::new(8, 4).unwrap();

        let (events, _) = collect(&mut source, geometry, &options(Duration::ZERO), None);

        assert_eq!(
            decoded(events),
            vec![
                DecodedEvent::DecodeError(DecodeError::TruncatedFrame { received: 2, expected: 4 }),
                DecodedEvent::LogLine("next".to_string()),
            ]
        );
    }

    #[test]
    fn test_would_block_is_a_poll_timeout() {
        let mut source = ScriptedSource::new(vec![
            Ok(b"a\n".to_vec()),
            Err(io::Error::new(ErrorKind::WouldBlock, "no data")),
            Ok(b"b\n".to_vec()),
        ]);
        let geometry = FrameGeometry::new(8, 1).unwrap();

        let (events, reason) = collect(&mut source, geometry, &options(Duration::from_secs(1)), None);

        assert_eq!(reason, StreamEndReason::Disconnected);
        assert_eq!(
            decoded(events),
            vec![
                DecodedEvent::LogLine("a".to_string()),
                DecodedEvent::LogLine("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_would_block_mid_frame_truncates_after_timeout() {
        let mut source = ScriptedSource::new(vec![
            Ok(b"IMG_START\n\x01".to_vec()),
            Err(io::Error::new(ErrorKind::WouldBlock, "no data")),
        ]);
        let geometry = FrameGeometry::new(8, 2).unwrap();

        let (events, _) = collect(&mut source, geometry, &options(Duration::ZERO), None);

        assert_eq!(
            decoded(events),
            vec![DecodedEvent::DecodeError(DecodeError::TruncatedFrame { received: 1, expected: 2 })]
        );
    }

    #[test]
    fn test_timeout_in_text_mode_keeps_partial_line() {
        let mut source = ScriptedSource::new(vec![
            Ok(b"par".to_vec()),
            Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
            Ok(b"tial\n".to_vec()),
        ]);
        let geometry = FrameGeometry::new(8, 1).unwrap();

        let (events, _) = collect(&mut source, geometry, &options(Duration::ZERO), None);

        assert_eq!(decoded(events), vec![DecodedEvent::LogLine("partial".to_string())]);
    }

    #[test]
    fn test_eof_mid_frame_truncates() {
        let mut source = ScriptedSource::new(vec![Ok(b"IMG_START\n\x00".to_vec())]);
        let geometry = FrameGeometry::new(8, 2).unwrap();

        let (events, reason) = collect(&mut source, geometry, &options(Duration::from_secs(60)), None);

        assert_eq!(reason, StreamEndReason::Disconnected);
        assert_eq!(
            decoded(events),
            vec![DecodedEvent::DecodeError(DecodeError::TruncatedFrame { received: 1, expected: 2 })]
        );
    }

    #[test]
    fn test_read_error_ends_stream() {
        let mut source = ScriptedSource::new(vec![
            Ok(b"a\n".to_vec()),
            Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
            Ok(b"never\n".to_vec()),
        ]);
        let geometry = FrameGeometry::new(8, 1).unwrap();

        let (events, reason) = collect(&mut source, geometry, &options(Duration::from_secs(1)), None);

        assert_eq!(reason, StreamEndReason::Error);
        assert!(matches!(events.last(), Some(SimEvent::Error(IoError::Read { .. }))));
    }

    #[test]
    fn test_interrupted_is_retried() {
        let mut source = ScriptedSource::new(vec![
            Err(io::Error::new(ErrorKind::Interrupted, "signal")),
            Ok(b"ok\n".to_vec()),
        ]);
        let geometry = FrameGeometry::new(8, 1).unwrap();

        let (events, reason) = collect(&mut source, geometry, &options(Duration::from_secs(1)), None);

        assert_eq!(reason, StreamEndReason::Disconnected);
        assert_eq!(decoded(events), vec![DecodedEvent::LogLine("ok".to_string())]);
    }

    #[test]
    fn test_cancel_before_read() {
        let mut source = ScriptedSource::new(vec![Ok(b"ignored\n".to_vec())]);
        let mut decoder = LineFrameDecoder::new(FrameGeometry::default());
        let cancel = AtomicBool::new(true);
        let mut count = 0;

        let reason = run_decode_loop(
            &mut source,
            &mut decoder,
            &options(Duration::from_secs(1)),
            &cancel,
            None,
            |_| count += 1,
        );

        assert_eq!(reason, StreamEndReason::Stopped);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_capture_tees_raw_bytes() {
        let raw = b"log\nIMG_START\n\xff".to_vec();
        let mut source = ScriptedSource::new(vec![Ok(raw.clone())]);
        let geometry = FrameGeometry::new(8, 1).unwrap();
        let mut captured: Vec<u8> = Vec::new();

        collect(&mut source, geometry, &options(Duration::from_secs(1)), Some(&mut captured as &mut dyn Write));

        assert_eq!(captured, raw);
    }

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(config.line.baud_rate, 115_200);
        assert_eq!(config.geometry.frame_len(), 48_000);
        assert_eq!(config.marker, "IMG_START");
        assert_eq!(config.frame_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_missing_port_reports_error_and_end() {
        let (tx, mut rx) = crate::io::event_channel();
        let mut reader = SerialReader::new(SerialConfig::new("/dev/glance-sim-does-not-exist"), tx);

        reader.start().await.unwrap();
        assert!(reader.start().await.is_err());

        let first = rx.recv().await;
        assert!(matches!(first, Some(SimEvent::Error(IoError::Connection { .. }))));
        let second = rx.recv().await;
        assert!(matches!(second, Some(SimEvent::Ended(_, StreamEndReason::Error))));

        reader.stop().await.unwrap();
        assert_eq!(reader.state(), IOState::Stopped);
    }
}
