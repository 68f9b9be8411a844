//! Controller-data transport core for a BLE UART accessory.
//!
//! A [`ControllerModuleManager`] multiplexes the controller modules (sensor
//! streaming, control pad, color wheel, talk box, word assignments) onto one
//! duplex byte link, frames every outbound command with a checksum, polls
//! enabled sensors on a fixed interval and caches the peripheral's raw text
//! output for whichever module screen is attached.

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod manager;

pub use domain::commands::{ColorComponents, OutboundCommand, Rgb};
pub use domain::models::{ControllerType, ManagerNotification, SensorReading};
pub use domain::settings::{Checksum, ControllerSettings, SettingsService};
pub use error::ControllerError;
pub use infrastructure::companion::{CommandSource, CompanionBridge, CompanionEvent};
pub use infrastructure::sensors::{SensorFeed, SensorSource};
pub use infrastructure::uart::{FrameCodec, OpenLink, ReadyStream, TcpBridge, UartLink};
pub use manager::{ControllerModuleManager, ListenerHandle, UartTextListener};
