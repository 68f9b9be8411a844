//! UART Module
//!
//! Byte-level plumbing between the controller module manager and the
//! peripheral.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                ControllerModuleManager                   │
//! │      (owner context - sole writer of all state)          │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │  CoreEvent (mpsc)
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │   Link    │  │    Poll    │  │ Protocol │
//! │           │  │            │  │          │
//! │ - open    │  │ - ticker   │  │ - frames │
//! │ - reader  │  │ - sensor   │  │ - check- │
//! │ - writer  │  │   reads    │  │   sums   │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Frame codec, checksums and sensor report format
//! - [`link`] - Link negotiation and the reader/writer tasks
//! - [`poll`] - Periodic sensor polling

pub mod link;
pub mod poll;
pub mod protocol;

use crate::domain::models::SensorReading;
use crate::error::ControllerError;
use crate::infrastructure::companion::CompanionEvent;

pub use link::{OpenLink, ReadyStream, TcpBridge, UartLink};
pub use poll::PollLoop;
pub use protocol::FrameCodec;

/// Everything background tasks report back to the owner context
#[derive(Debug)]
pub(crate) enum CoreEvent {
    UartReady(Result<(), ControllerError>),
    RxBytes(Vec<u8>),
    /// Decoded from the peripheral's inbound stream
    SensorReport(SensorReading),
    /// Read by the poll loop during run `run_id`
    SensorSample { run_id: u64, reading: SensorReading },
    Tick { run_id: u64 },
    DeliveryFailed(ControllerError),
    LinkClosed,
    Companion(CompanionEvent),
}
