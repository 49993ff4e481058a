// src/lib.rs
//
// glance-sim: stands in for an e-paper panel on the desktop. A display
// controller's serial output is split into log text and 1-bit framebuffers,
// which are shown in a terminal UI or printed headless.

#[macro_use]
mod logging;

pub mod cli;
pub mod framebuffer;
pub mod io;
pub mod settings;
pub mod sink;
pub mod tui;

pub use logging::{init_file_logging, set_console_logging, stop_file_logging};

use clap::Parser;
use std::path::PathBuf;

use cli::{Cli, Command, ConnectArgs, OutputArgs, ReplayArgs};
use io::{event_channel, EventReceiver, IODevice, ReplayConfig, ReplayReader, SerialConfig, SerialReader};
use settings::{default_settings_path, load_settings, SimSettings};
use sink::{route_sim_event, ConsoleSink};
use tui::TuiSink;

/// Parse the command line and run the selected command to completion.
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_file_logging(path)?;
    }

    let result = dispatch(cli);
    stop_file_logging();
    result
}

fn dispatch(cli: Cli) -> Result<(), String> {
    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_settings_path()?,
    };
    let mut settings = load_settings(&settings_path)?;
    cli.command.apply(&mut settings);
    settings
        .validate()
        .map_err(|e| format!("Invalid settings ({}): {}", settings_path.display(), e))?;

    match cli.command {
        Command::Settings(_) => {
            let json = serde_json::to_string_pretty(&settings)
                .map_err(|e| format!("Failed to serialize settings: {}", e))?;
            println!("{}", json);
            Ok(())
        }
        Command::Connect(args) => runtime()?.block_on(run_connect(args, settings)),
        Command::Replay(args) => runtime()?.block_on(run_replay(args, settings)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))
}

async fn run_connect(args: ConnectArgs, settings: SimSettings) -> Result<(), String> {
    let mut config = SerialConfig::new(args.port.as_str());
    config.line = settings.line_settings();
    config.geometry = settings.geometry()?;
    config.marker = settings.image_marker.clone();
    config.max_line_length = settings.max_line_length;
    config.frame_timeout = settings.frame_timeout();
    config.capture_path = args.capture.clone();

    let (tx, rx) = event_channel();
    let mut reader = SerialReader::new(config, tx);
    present(&mut reader, rx, &settings, &args.output).await
}

async fn run_replay(args: ReplayArgs, settings: SimSettings) -> Result<(), String> {
    let mut config = ReplayConfig::new(args.file.as_path());
    config.geometry = settings.geometry()?;
    config.marker = settings.image_marker.clone();
    config.max_line_length = settings.max_line_length;
    config.pace_baud = args.pace_baud;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }

    let (tx, rx) = event_channel();
    let mut reader = ReplayReader::new(config, tx);
    present(&mut reader, rx, &settings, &args.output).await
}

async fn present(
    device: &mut dyn IODevice,
    events: EventReceiver,
    settings: &SimSettings,
    output: &OutputArgs,
) -> Result<(), String> {
    tlog!(
        "[main] Starting {} source {} ({}x{}, marker {:?})",
        device.device_type(),
        device.source_name(),
        settings.display_width,
        settings.display_height,
        settings.image_marker
    );

    if output.headless {
        let mut sink = ConsoleSink::new(settings.snapshot_dir.as_ref().map(PathBuf::from));
        run_headless(device, events, &mut sink).await
    } else {
        let sink = TuiSink::new(settings.geometry()?, settings.log_history);
        tui::run_tui(device, events, sink).await
    }
}

/// Print events until the stream ends or Ctrl-C is pressed.
async fn run_headless(
    device: &mut dyn IODevice,
    mut events: EventReceiver,
    sink: &mut ConsoleSink,
) -> Result<(), String> {
    device.start().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !route_sim_event(event, sink) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tlog!("[main] Interrupted, stopping {}", device.source_name());
                break;
            }
        }
    }

    device.stop().await?;
    // A cancelled reader still reports the abandoned frame and its end
    while let Ok(event) = events.try_recv() {
        route_sim_event(event, sink);
    }

    tlog!("[main] {} frame(s) displayed", sink.frames());
    Ok(())
}
