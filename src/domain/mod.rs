//! Protocol-independent state of the controller module: sensor readings,
//! the RX text cache, outbound intents and settings.

pub mod commands;
pub mod models;
pub mod rx_buffer;
pub mod sensor_cache;
pub mod settings;
