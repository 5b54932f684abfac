//! Move requests and their outcomes.
//!
//! Every physical movement of the lid starts life as a [`MoveRequest`]:
//!
//! 1. A producer (the connection manager or the pedal bridge) builds one from
//!    a bin number and its [`CommandSource`]
//! 2. It is pushed onto the [`MoveQueue`](crate::queue::MoveQueue)
//! 3. The [`MoveConsumer`](crate::queue::MoveConsumer) services it and reports
//!    a [`MoveOutcome`]
//!
//! Requests are served strictly in arrival order. The source is recorded for
//! logging only; it never changes the order.

use core::fmt;

use tokio::time::Instant;

use crate::error::ControlError;

// ============================================================================
// Command Source
// ============================================================================

/// Where a move request came from.
///
/// ```rust
/// use smart_can::CommandSource;
///
/// assert_eq!(CommandSource::Pedal.as_str(), "pedal");
/// assert_eq!(CommandSource::Remote.to_string(), "remote");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// A `rotate` command from the server.
    Remote,
    /// A pedal press on the can itself.
    Pedal,
}

impl CommandSource {
    /// Lowercase name used in logs
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandSource::Remote => "remote",
            CommandSource::Pedal => "pedal",
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Open the lid over `bin`, wait, then close it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveRequest {
    /// Bin to open.
    pub bin: u8,
    /// Producer of the request.
    pub source: CommandSource,
}

impl MoveRequest {
    /// Create a request.
    pub const fn new(bin: u8, source: CommandSource) -> Self {
        Self { bin, source }
    }

    /// Request from the server.
    pub const fn remote(bin: u8) -> Self {
        Self::new(bin, CommandSource::Remote)
    }

    /// Request from a pedal.
    pub const fn pedal(bin: u8) -> Self {
        Self::new(bin, CommandSource::Pedal)
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "move to bin #{} ({})", self.bin, self.source)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened while servicing one [`MoveRequest`].
///
/// The open and close attempts are recorded separately; a failed open is
/// always followed by a close attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveOutcome {
    /// The serviced request.
    pub request: MoveRequest,
    /// Result of opening the lid.
    pub open: Result<(), ControlError>,
    /// Result of closing the lid afterwards.
    pub close: Result<(), ControlError>,
    /// When servicing began.
    pub started_at: Instant,
    /// When the close attempt finished.
    pub finished_at: Instant,
}

impl MoveOutcome {
    /// True if both open and close succeeded.
    pub fn is_success(&self) -> bool {
        self.open.is_ok() && self.close.is_ok()
    }
}
