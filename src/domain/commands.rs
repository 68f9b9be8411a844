//! Command Encoder
//!
//! Translates front-end intents (pad and talk-box buttons, color wheel,
//! word assignments, talk-box enable table) into the accessory's ASCII
//! command protocol. Every message produced here still has to go through the
//! frame codec before it is written to the peripheral.

use crate::error::{ControllerError, Result};
use std::collections::BTreeMap;

/// Module prefixes understood by the accessory firmware
pub mod prefix {
    pub const BUTTON: &[u8] = b"!B";
    pub const COLOR: &[u8] = b"!C";
    pub const WORD: &[u8] = b"!W";
    pub const ENABLE_ENTRY: &[u8] = b"!S";
}

/// Fixed width of a word in a word assignment message
pub const WORD_WIDTH: usize = 10;

/// Normalized color as picked on a color wheel, channels in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Rgb {
    pub fn new(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue }
    }
}

/// Raw 8-bit channels as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorComponents {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ColorComponents {
    /// Scale each channel by `brightness` and truncate to 0..=255
    pub fn from_rgb(color: Rgb, brightness: f32) -> Self {
        let brightness = brightness.clamp(0.0, 1.0);
        Self {
            red: channel_to_byte(color.red * brightness),
            green: channel_to_byte(color.green * brightness),
            blue: channel_to_byte(color.blue * brightness),
        }
    }

    /// Unpack a `0xRRGGBB` value
    pub fn from_hex(hex: u32) -> Self {
        Self {
            red: ((hex >> 16) & 0xFF) as u8,
            green: ((hex >> 8) & 0xFF) as u8,
            blue: (hex & 0xFF) as u8,
        }
    }

    pub fn as_bytes(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

fn channel_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    // Truncation, not rounding
    (255.0 * value.clamp(0.0, 1.0)) as u8
}

/// High-level outbound intents
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    ButtonEvent { tag: u32, is_pressed: bool },
    ColorSet(ColorComponents),
    WordAssignmentSave { slot: u8, word: String },
    /// Talk-box enable table, one wire message per entry in ascending index order
    EnableTableSave(BTreeMap<u32, bool>),
}

/// One protocol message before framing: module prefix plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub prefix: &'static [u8],
    pub body: Vec<u8>,
}

impl EncodedMessage {
    /// Prefix and body as a single byte string (no checksum)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.prefix.len() + self.body.len());
        bytes.extend_from_slice(self.prefix);
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

impl OutboundCommand {
    /// Encode into one or more wire messages.
    ///
    /// Fails only for words containing control characters, which would break
    /// the fixed-width text field.
    pub fn encode(&self) -> Result<Vec<EncodedMessage>> {
        match self {
            Self::ButtonEvent { tag, is_pressed } => Ok(vec![EncodedMessage {
                prefix: prefix::BUTTON,
                body: format!("{}{}", tag, if *is_pressed { "1" } else { "0" }).into_bytes(),
            }]),
            Self::ColorSet(components) => Ok(vec![EncodedMessage {
                prefix: prefix::COLOR,
                body: components.as_bytes().to_vec(),
            }]),
            Self::WordAssignmentSave { slot, word } => {
                if let Some(c) = word.chars().find(|c| c.is_control()) {
                    return Err(ControllerError::Encoding(format!(
                        "word {:?} contains control character {:?}",
                        word, c
                    )));
                }
                // Width is counted in characters, the body carries UTF-8
                Ok(vec![EncodedMessage {
                    prefix: prefix::WORD,
                    body: format!("{}{}", slot, pad_word(word)).into_bytes(),
                }])
            }
            Self::EnableTableSave(entries) => Ok(entries
                .iter()
                .map(|(index, enabled)| EncodedMessage {
                    prefix: prefix::ENABLE_ENTRY,
                    body: format!("{},{};", index, if *enabled { "T" } else { "F" })
                        .into_bytes(),
                })
                .collect()),
        }
    }

    /// Press followed by release, as sent for a companion tap
    pub fn tap(tag: u32) -> [OutboundCommand; 2] {
        [
            Self::ButtonEvent {
                tag,
                is_pressed: true,
            },
            Self::ButtonEvent {
                tag,
                is_pressed: false,
            },
        ]
    }
}

/// Truncate or right-pad with spaces to exactly [`WORD_WIDTH`] characters
pub fn pad_word(word: &str) -> String {
    let mut padded: String = word.chars().take(WORD_WIDTH).collect();
    let len = padded.chars().count();
    padded.extend(std::iter::repeat(' ').take(WORD_WIDTH - len));
    padded
}
