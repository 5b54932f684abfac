//! Network abstraction traits for the server command channel.
//!
//! The connection manager is written against these two traits so that the
//! reconnect and dispatch logic can be exercised with scripted sessions
//! instead of a live server.
//!
//! # Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Connector`] | Opens a new session to a URL |
//! | [`CommandChannel`] | One open session: read frames, send frames |
//!
//! # Framing
//!
//! Each frame carries exactly one JSON object. Implementations hand complete
//! text frames to the caller and never buffer partial objects across reads;
//! the transport's own framing is relied upon.
//!
//! # Implementations
//!
//! - `services::ws::WsConnector` (feature `ws`): websocket via `tokio-tungstenite`
//! - [`MockConnector`](crate::hal::MockConnector): scripted sessions for tests

use core::future::Future;

use crate::error::ConnectionError;

/// An open, bidirectional text-frame channel.
pub trait CommandChannel {
    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection, and
    /// `Some(Err(_))` if the connection failed.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, ConnectionError>>>;

    /// Send one text frame.
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), ConnectionError>>;
}

/// Factory for [`CommandChannel`] sessions.
///
/// The connection manager calls [`connect`](Connector::connect) once per
/// attempt and drops the channel when the session ends.
pub trait Connector {
    /// Channel type produced by a successful connection.
    type Channel: CommandChannel;

    /// Open a new session to `url`.
    fn connect(&mut self, url: &str) -> impl Future<Output = Result<Self::Channel, ConnectionError>>;
}
