//! Controller UART Protocol
//!
//! Frame codec shared by every outbound command, and the sensor report
//! format used in both directions.

use crate::domain::commands::EncodedMessage;
use crate::domain::models::{ControllerType, SensorReading};
use crate::domain::settings::Checksum;

/// Leading byte of every sensor report
pub const SENSOR_REPORT_MARKER: u8 = b'!';

impl Checksum {
    pub fn compute(self, bytes: &[u8]) -> u8 {
        match self {
            Self::InvertedSum => !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)),
            Self::Xor => bytes.iter().fold(0u8, |acc, b| acc ^ b),
        }
    }
}

/// Appends the checksum byte to outbound messages.
///
/// Payload length is not capped here; the link rejects frames larger than
/// its negotiated write size.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    checksum: Checksum,
}

impl FrameCodec {
    pub fn new(checksum: Checksum) -> Self {
        Self { checksum }
    }

    /// `prefix + payload + checksum(prefix + payload)`
    pub fn encode(&self, prefix: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(prefix.len() + payload.len() + 1);
        frame.extend_from_slice(prefix);
        frame.extend_from_slice(payload);
        frame.push(self.checksum.compute(&frame));
        frame
    }

    pub fn encode_message(&self, message: &EncodedMessage) -> Vec<u8> {
        self.encode(message.prefix, &message.body)
    }

    /// True when the last byte is the checksum of everything before it
    pub fn verify(&self, frame: &[u8]) -> bool {
        match frame.split_last() {
            Some((last, body)) => self.checksum.compute(body) == *last,
            None => false,
        }
    }
}

/// Length of a complete sensor report frame for `sensor`
pub fn sensor_report_len(sensor: ControllerType) -> usize {
    2 + sensor.arity() * 4 + 1
}

/// `!<letter>` followed by each component as little-endian f32
pub fn sensor_report_message(reading: &SensorReading) -> EncodedMessage {
    let prefix: &'static [u8] = match reading.sensor() {
        ControllerType::Quaternion => b"!Q",
        ControllerType::Accelerometer => b"!A",
        ControllerType::Gyroscope => b"!G",
        ControllerType::Magnetometer => b"!M",
        ControllerType::Location => b"!L",
    };
    let body = reading
        .components()
        .iter()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    EncodedMessage { prefix, body }
}

/// Decode a chunk that is exactly one checksum-valid sensor report.
///
/// Anything else returns `None` and is treated as raw text by the caller.
pub fn decode_sensor_report(codec: &FrameCodec, bytes: &[u8]) -> Option<SensorReading> {
    if bytes.len() < 3 || bytes[0] != SENSOR_REPORT_MARKER {
        return None;
    }
    let sensor = ControllerType::from_wire_letter(bytes[1])?;
    if bytes.len() != sensor_report_len(sensor) || !codec.verify(bytes) {
        return None;
    }

    let components = bytes[2..bytes.len() - 1]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    #[cfg(debug_assertions)]
    tracing::trace!("Sensor report {}: {:02X?}", sensor, bytes);

    SensorReading::new(sensor, components).ok()
}
