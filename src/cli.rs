// src/cli.rs
//
// Command line surface. Flags only override settings; run() in lib.rs owns
// what happens next.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::io::Parity;
use crate::settings::SimSettings;

#[derive(Parser, Debug)]
#[command(
    name = "glance-sim",
    about = "Simulate a 1-bit e-paper display fed over a serial link",
    version
)]
pub struct Cli {
    #[arg(long = "log-file", value_name = "PATH", global = true, help = "Mirror diagnostics to this file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_name = "PATH", global = true, help = "Settings file (defaults to the user config dir)")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a serial port and display what the controller sends
    Connect(ConnectArgs),
    /// Play back a capture file through the decoder
    Replay(ReplayArgs),
    /// Print the effective settings as JSON
    Settings(DisplayArgs),
}

/// Overrides shared by every command
#[derive(Args, Debug, Default, Clone)]
pub struct DisplayArgs {
    #[arg(long, value_name = "PX", help = "Panel width in pixels")]
    pub width: Option<usize>,

    #[arg(long, value_name = "PX", help = "Panel height in pixels")]
    pub height: Option<usize>,

    #[arg(long, value_name = "TEXT", help = "Line prefix announcing a framebuffer")]
    pub marker: Option<String>,
}

/// How decoded output is presented
#[derive(Args, Debug, Default, Clone)]
pub struct OutputArgs {
    #[arg(long, action = clap::ArgAction::SetTrue, help = "Print to stdout instead of the terminal UI")]
    pub headless: bool,

    #[arg(long = "snapshot-dir", value_name = "DIR", help = "Write each frame as a .pbm file (headless)")]
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    #[arg(value_name = "PORT", help = "Serial port, e.g. /dev/ttyUSB0 or COM4")]
    pub port: String,

    #[arg(long, value_name = "N")]
    pub baud: Option<u32>,

    #[arg(long = "data-bits", value_name = "N")]
    pub data_bits: Option<u8>,

    #[arg(long = "stop-bits", value_name = "N")]
    pub stop_bits: Option<u8>,

    #[arg(long, value_enum)]
    pub parity: Option<Parity>,

    #[arg(long, value_name = "FILE", help = "Tee received bytes into FILE for later replay")]
    pub capture: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub display: DisplayArgs,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    #[arg(value_name = "FILE", help = "Capture file of raw serial bytes")]
    pub file: PathBuf,

    #[arg(long = "pace-baud", value_name = "N", help = "Replay at this line rate instead of as fast as possible")]
    pub pace_baud: Option<u32>,

    #[arg(long = "chunk-size", value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub display: DisplayArgs,
}

impl DisplayArgs {
    pub fn apply(&self, settings: &mut SimSettings) {
        if let Some(width) = self.width {
            settings.display_width = width;
        }
        if let Some(height) = self.height {
            settings.display_height = height;
        }
        if let Some(marker) = &self.marker {
            settings.image_marker = marker.clone();
        }
    }
}

impl OutputArgs {
    pub fn apply(&self, settings: &mut SimSettings) {
        if let Some(dir) = &self.snapshot_dir {
            settings.snapshot_dir = Some(dir.display().to_string());
        }
    }
}

impl ConnectArgs {
    pub fn apply(&self, settings: &mut SimSettings) {
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(bits) = self.data_bits {
            settings.data_bits = bits;
        }
        if let Some(bits) = self.stop_bits {
            settings.stop_bits = bits;
        }
        if let Some(parity) = self.parity {
            settings.parity = parity;
        }
        self.output.apply(settings);
        self.display.apply(settings);
    }
}

impl ReplayArgs {
    pub fn apply(&self, settings: &mut SimSettings) {
        self.output.apply(settings);
        self.display.apply(settings);
    }
}

impl Command {
    /// Fold command line overrides into the loaded settings
    pub fn apply(&self, settings: &mut SimSettings) {
        match self {
            Command::Connect(args) => args.apply(settings),
            Command::Replay(args) => args.apply(settings),
            Command::Settings(args) => args.apply(settings),
        }
    }
}
