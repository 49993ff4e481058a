// src/io/serial/mod.rs
//
// Serial port driver for the display controller link.
//
// Features:
// - Line/frame decoding of the log + framebuffer stream (framer)
// - Blocking read loop shared with capture replay (reader)
// - Optional tee of raw bytes to a capture file

pub mod framer;
pub mod reader;
pub(crate) mod utils;

pub use reader::{run_decode_loop, DecodeLoopOptions, SerialConfig, SerialReader};
pub use utils::{LineSettings, Parity};
