//! Temperature telemetry decoding
//! This module turns raw notification payloads from a thermometer into
//! Celsius/Fahrenheit readings.
//!
//! The layout is chosen by payload length, most specific first:
//!
//! | length | layout |
//! |---|---|
//! | ≥ 5 | flags byte (ignored), then a 32-bit float in °C |
//! | 4 | a 32-bit float in °C |
//! | 2–3 | a signed 16-bit integer in hundredths of °C |
//! | 1 | an unsigned byte in whole °C |
//!
//! Many cheap thermometers do not follow the Health Thermometer encoding, so
//! the shorter layouts act as a fallback. Every frame is decoded on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte order of multi-byte values in the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Error decoding a single telemetry frame.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum DecodeError {
    #[error("telemetry frame is empty")]
    TooShort,

    #[error("malformed telemetry frame: {0}")]
    DecodeFailure(String),
}

/// A raw notification payload as received from the peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    /// Monotonically increasing per session, for ordering diagnostics
    pub sequence: u64,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl TelemetryFrame {
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// A decoded temperature reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedTelemetry {
    pub celsius: f64,
    pub fahrenheit: f64,
    pub received_at: DateTime<Utc>,
    pub sequence: u64,
}

/// Converts degrees Celsius to degrees Fahrenheit.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Decodes a payload into degrees Celsius.
pub fn decode_celsius(buffer: &[u8], byte_order: ByteOrder) -> Result<f64, DecodeError> {
    let celsius = match buffer.len() {
        0 => return Err(DecodeError::TooShort),
        1 => f64::from(buffer[0]),
        2 | 3 => f64::from(read_i16(buffer[0], buffer[1], byte_order)) / 100.0,
        4 => read_f32(&buffer[..4], byte_order)?,
        _ => read_f32(&buffer[1..5], byte_order)?,
    };
    Ok(celsius)
}

/// Decodes a payload into a reading stamped with `received_at`.
pub fn decode(
    buffer: &[u8],
    byte_order: ByteOrder,
    received_at: DateTime<Utc>,
) -> Result<DecodedTelemetry, DecodeError> {
    let celsius = decode_celsius(buffer, byte_order)?;
    Ok(DecodedTelemetry {
        celsius,
        fahrenheit: celsius_to_fahrenheit(celsius),
        received_at,
        sequence: 0,
    })
}

fn read_i16(first: u8, second: u8, byte_order: ByteOrder) -> i16 {
    match byte_order {
        ByteOrder::Little => i16::from_le_bytes([first, second]),
        ByteOrder::Big => i16::from_be_bytes([first, second]),
    }
}

fn read_f32(bytes: &[u8], byte_order: ByteOrder) -> Result<f64, DecodeError> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| {
            DecodeError::DecodeFailure(format!("expected 4 float bytes, got {}", bytes.len()))
        })?;
    let value = match byte_order {
        ByteOrder::Little => f32::from_le_bytes(raw),
        ByteOrder::Big => f32::from_be_bytes(raw),
    };
    if !value.is_finite() {
        return Err(DecodeError::DecodeFailure(format!(
            "temperature is not a finite number ({value})"
        )));
    }
    Ok(f64::from(value))
}

/// Frame decoder for one monitoring session.
///
/// Keeps running counts so a session can report how many frames it rejected.
#[derive(Debug, Clone, Default)]
pub struct TelemetryDecoder {
    byte_order: ByteOrder,
    decoded: u64,
    rejected: u64,
}

impl TelemetryDecoder {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            decoded: 0,
            rejected: 0,
        }
    }

    /// Decodes one frame. A failure only affects this frame.
    pub fn decode_frame(
        &mut self,
        frame: &TelemetryFrame,
    ) -> Result<DecodedTelemetry, DecodeError> {
        match decode(&frame.payload, self.byte_order, frame.received_at) {
            Ok(reading) => {
                self.decoded += 1;
                Ok(DecodedTelemetry {
                    sequence: frame.sequence,
                    ..reading
                })
            }
            Err(e) => {
                self.rejected += 1;
                Err(e)
            }
        }
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
