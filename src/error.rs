//! Error types surfaced by the controller module core.

use crate::domain::models::ControllerType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// The peripheral UART could not be negotiated. Fatal for the session.
    #[error("Failed to initialize UART on peripheral: {0}")]
    TransportInit(String),

    /// The sensor source refused the (un)subscription. Recoverable.
    #[error("Could not enable {sensor} updates: {reason}")]
    SensorSubscribe {
        sensor: ControllerType,
        reason: String,
    },

    /// The command cannot be represented on the wire; the send is dropped.
    #[error("Cannot encode command: {0}")]
    Encoding(String),

    /// The transport rejected or failed to write a frame.
    #[error("Frame delivery failed: {0}")]
    Delivery(String),

    #[error("A {sensor} reading has {expected} components, got {actual}")]
    Arity {
        sensor: ControllerType,
        expected: usize,
        actual: usize,
    },

    #[error("Poll loop is already running")]
    PollAlreadyRunning,

    #[error("Poll interval must be greater than zero")]
    InvalidPollInterval,
}

pub type Result<T> = std::result::Result<T, ControllerError>;
