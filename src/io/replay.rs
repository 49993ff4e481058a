// src/io/replay.rs
//
// Replays a capture file (raw bytes tee'd from a live port) through the same
// decode loop, optionally paced to the original baud rate.

use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::serial::framer::{FrameGeometry, LineFrameDecoder, DEFAULT_MAX_LINE_LENGTH, IMAGE_MARKER};
use super::serial::reader::{run_decode_loop, spawn_stream, DecodeLoopOptions};
use super::{EventSender, IODevice, IOState, IoError, SimEvent, StreamEndReason};

/// Default replay chunk, matching a typical USB CDC transfer
pub const DEFAULT_REPLAY_CHUNK_SIZE: usize = 256;

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    pub path: PathBuf,
    pub geometry: FrameGeometry,
    pub marker: String,
    pub max_line_length: usize,
    pub chunk_size: usize,
    /// Pace playback as if received at this baud rate (None = as fast as possible)
    pub pace_baud: Option<u32>,
}

impl ReplayConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ReplayConfig {
            path: path.into(),
            geometry: FrameGeometry::default(),
            marker: IMAGE_MARKER.to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            chunk_size: DEFAULT_REPLAY_CHUNK_SIZE,
            pace_baud: None,
        }
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Capture file reader implementing IODevice
pub struct ReplayReader {
    config: ReplayConfig,
    name: String,
    events: EventSender,
    state: IOState,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
}

impl ReplayReader {
    pub fn new(config: ReplayConfig, events: EventSender) -> Self {
        let name = config.display_name();
        Self {
            config,
            name,
            events,
            state: IOState::Stopped,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
        }
    }
}

#[async_trait]
impl IODevice for ReplayReader {
    async fn start(&mut self) -> Result<(), String> {
        if self.state == IOState::Running {
            return Err("Replay is already running".to_string());
        }

        self.state = IOState::Starting;
        self.cancel_flag.store(false, Ordering::Relaxed);

        let config = self.config.clone();
        let name = self.name.clone();
        let cancel_flag = self.cancel_flag.clone();
        let events = self.events.clone();

        let handle = spawn_stream("Replay", self.name.clone(), self.events.clone(), move || {
            run_replay_blocking(config, name, cancel_flag, events)
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
                .map_err(|e| format!("Failed to join replay reader: {}", e))?;
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
        &self.name
    }

    fn device_type(&self) -> &'static str {
        "replay"
    }
}

fn run_replay_blocking(config: ReplayConfig, name: String, cancel_flag: Arc<AtomicBool>, events: EventSender) {
    let file = match File::open(&config.path) {
        Ok(f) => f,
        Err(e) => {
            let err = IoError::connection(config.path.display().to_string(), e.to_string());
            tlog!("[Replay] {}", err);
            let _ = events.send(SimEvent::Error(err));
            let _ = events.send(SimEvent::Ended(name, StreamEndReason::Error));
            return;
        }
    };
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);

    tlog!(
        "[Replay] Streaming {} ({} bytes, chunk {}, pace: {})",
        config.path.display(),
        size,
        config.chunk_size,
        config
            .pace_baud
            .map(|b| format!("{} bps", b))
            .unwrap_or_else(|| "none".to_string())
    );
    let _ = events.send(SimEvent::Connected(
        name.clone(),
        format!("Replaying {} ({} bytes).", config.path.display(), size),
    ));

    let mut decoder = LineFrameDecoder::with_options(config.geometry, &config.marker, config.max_line_length);
    let options = DecodeLoopOptions {
        source_name: format!("Replay:{}", name),
        // Files never time out; truncation is reported at end of file
        frame_timeout: Duration::MAX,
        eof_reason: StreamEndReason::Complete,
        chunk_size: config.chunk_size,
        pace_baud: config.pace_baud,
    };

    let mut reader = BufReader::new(file);
    let reason = run_decode_loop(&mut reader, &mut decoder, &options, &cancel_flag, None, |event| {
        let _ = events.send(event);
    });

    tlog!("[Replay] {} ended ({})", name, reason.as_str());
    let _ = events.send(SimEvent::Ended(name, reason));
}
