// src/io/serial/utils.rs
//
// Serial line settings and their mapping onto the serialport crate.
// The simulator never negotiates these; they come from settings or the CLI.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, SerialPortBuilder, StopBits};

use crate::io::IoError;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Fixed line parameters for one port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl Default for LineSettings {
    fn default() -> Self {
        LineSettings {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

impl LineSettings {
    /// Short form for logs, e.g. `115200 8-N-1`
    pub fn describe(&self) -> String {
        format!(
            "{} {}-{}-{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }

    /// Build a serialport builder for `port`, rejecting values the driver cannot express.
    pub fn to_builder(&self, port: &str, poll_timeout: Duration) -> Result<SerialPortBuilder, IoError> {
        if self.baud_rate == 0 {
            return Err(IoError::config(port, "baud rate must be non-zero"));
        }
        let data_bits = to_serialport_data_bits(self.data_bits).ok_or_else(|| {
            IoError::config(port, format!("unsupported data bits: {}", self.data_bits))
        })?;
        let stop_bits = to_serialport_stop_bits(self.stop_bits).ok_or_else(|| {
            IoError::config(port, format!("unsupported stop bits: {}", self.stop_bits))
        })?;

        Ok(serialport::new(port, self.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(self.parity))
            .timeout(poll_timeout))
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

fn to_serialport_data_bits(bits: u8) -> Option<DataBits> {
    match bits {
        5 => Some(DataBits::Five),
        6 => Some(DataBits::Six),
        7 => Some(DataBits::Seven),
        8 => Some(DataBits::Eight),
        _ => None,
    }
}

fn to_serialport_stop_bits(bits: u8) -> Option<StopBits> {
    match bits {
        1 => Some(StopBits::One),
        2 => Some(StopBits::Two),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
