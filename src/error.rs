//! Error types for every layer of the controller.
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`ControlError::Configuration`] | [`LidController::new`], [`MotorController::new`] | Fatal at startup |
//! | [`ControlError::BinOutOfRange`] | [`MotorController::move_to_bin`] | Rejected, never retried |
//! | [`ControlError::Hardware`] / [`ControlError::MoveTimeout`] | motion primitives | Logged by the move consumer, followed by a close |
//! | [`ConnectionError`] | connection manager | Retried with capped backoff |
//! | [`ProtocolError`] | frame decoding | Logged, the session keeps reading |
//! | [`ConfigError`] | config/credential loading | Reported by the binary |
//!
//! [`LidController::new`]: crate::LidController::new
//! [`MotorController::new`]: crate::MotorController::new
//! [`MotorController::move_to_bin`]: crate::MotorController::move_to_bin

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a platform binding (GPIO, interrupts, ADC).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// A pin was addressed that the platform does not drive.
    #[error("pin {0} is not available on this platform")]
    UnknownPin(u8),

    /// An analog channel was read that the platform does not expose.
    #[error("analog channel {0} is not available on this platform")]
    UnknownChannel(u8),

    /// The underlying driver rejected the operation.
    #[error("hardware driver error: {0}")]
    Driver(String),
}

/// Errors raised while moving the lid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// The controllers were wired up inconsistently; nothing can proceed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A bin index outside `[0, num_bins)` was requested.
    #[error("bin {bin} is out of range (controller has {num_bins} bins)")]
    BinOutOfRange {
        /// The requested bin.
        bin: u8,
        /// Number of bins the controller was built for.
        num_bins: u8,
    },

    /// The motor outputs or the position sensor failed.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// The move kept approaching for longer than the configured cap.
    #[error("move did not settle within {0:?}")]
    MoveTimeout(Duration),
}

/// Transient failures of the network command channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection could not be established.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// An established connection failed while reading or writing.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server refused the device credentials.
    #[error("server rejected credentials (code {0})")]
    Rejected(String),
}

/// A frame that could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame is not JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The object has no `command` field.
    #[error("frame has no command field")]
    MissingCommand,

    /// The command name is not part of the protocol.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A known command carried malformed fields.
    #[error("invalid '{command}' frame: {reason}")]
    InvalidField {
        /// Command name.
        command: String,
        /// Decoder message.
        reason: String,
    },

    /// A rotate frame named neither a usable position nor a category.
    #[error("invalid rotate target: {0}")]
    InvalidTarget(String),

    /// A rotate frame named a category with no bin assigned.
    #[error("no bin assigned to category '{0}'")]
    UnknownCategory(String),

    /// An outbound message could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Errors loading configuration or device credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// Offending path.
        path: String,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// Credentials exist but carry no password yet.
    #[error("device {0} has not been registered with the server")]
    NotRegistered(String),
}

/// The move consumer is gone, so nothing can be queued any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("move queue is closed")]
pub struct QueueClosed;
