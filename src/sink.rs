// src/sink.rs
//
// Output side of the simulator: where log text and decoded images end up.
// route_event() is the one place decoder output is turned into sink calls.

use std::path::PathBuf;

use crate::framebuffer::{self, PixelGrid};
use crate::io::{DecodedEvent, SimEvent};

/// Receives human-readable text and decoded images.
pub trait DisplaySink {
    /// Append one line to the log view
    fn log_line(&mut self, line: &str);

    /// Replace the display contents with `grid`
    fn show_image(&mut self, grid: &PixelGrid);
}

/// Deliver one decoder event. Errors are always surfaced as log text.
pub fn route_event(event: DecodedEvent, sink: &mut dyn DisplaySink) {
    match event {
        DecodedEvent::LogLine(text) => sink.log_line(&text),
        DecodedEvent::DecodeError(err) => sink.log_line(&err.to_string()),
        DecodedEvent::ImageFrame {
            payload,
            width,
            height,
        } => match framebuffer::unpack(&payload, width, height) {
            Ok(grid) => {
                sink.log_line("Received image data, updating display...");
                sink.show_image(&grid);
            }
            Err(e) => sink.log_line(&format!("Error: Unable to unpack image: {}", e)),
        },
    }
}

/// Deliver a reader message. Returns false once the stream has ended.
pub fn route_sim_event(event: SimEvent, sink: &mut dyn DisplaySink) -> bool {
    match event {
        SimEvent::Connected(_, detail) => sink.log_line(&detail),
        SimEvent::Decoded(decoded) => route_event(decoded, sink),
        SimEvent::Error(err) => sink.log_line(&format!("Error: {}", err)),
        SimEvent::Ended(_, reason) => {
            sink.log_line(&format!("Disconnected ({}).", reason.as_str()));
            return false;
        }
    }
    true
}

// ============================================================================
// Console Sink
// ============================================================================

/// Headless sink: log lines go to stdout, images are summarised and
/// optionally written as PBM snapshots.
pub struct ConsoleSink {
    snapshot_dir: Option<PathBuf>,
    frames: usize,
}

impl ConsoleSink {
    pub fn new(snapshot_dir: Option<PathBuf>) -> Self {
        ConsoleSink {
            snapshot_dir,
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    fn write_snapshot(&self, grid: &PixelGrid) -> Result<PathBuf, String> {
        let dir = match &self.snapshot_dir {
            Some(d) => d,
            None => return Err("no snapshot directory".to_string()),
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create snapshot dir: {}", e))?;

        let name = format!(
            "{}-frame{:04}.pbm",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            self.frames
        );
        let path = dir.join(name);
        std::fs::write(&path, framebuffer::to_pbm(grid))
            .map_err(|e| format!("Failed to write snapshot: {}", e))?;
        Ok(path)
    }
}

impl DisplaySink for ConsoleSink {
    fn log_line(&mut self, line: &str) {
        println!("{} {}", crate::logging::timestamp(), line);
    }

    fn show_image(&mut self, grid: &PixelGrid) {
        self.frames += 1;
        let ink = grid.dark_count() as f64 * 100.0 / (grid.width() * grid.height()).max(1) as f64;
        println!(
            "{} [display] frame {} ({}x{}, {:.1}% ink)",
            crate::logging::timestamp(),
            self.frames,
            grid.width(),
            grid.height(),
            ink
        );

        if self.snapshot_dir.is_some() {
            match self.write_snapshot(grid) {
                Ok(path) => tlog!("[display] Snapshot saved: {}", path.display()),
                Err(e) => tlog!("[display] {}", e),
            }
        }
    }
}
