//! Persistent server connection with reconnect backoff.
//!
//! The [`ConnectionManager`] owns the command channel exclusively. It cycles
//! through [`ConnectionState`]s forever:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (read error / close) -> Disconnected
//!                      \-> (connect failure) -> Disconnected
//! ```
//!
//! Between attempts it sleeps for the current [`Backoff`] cooldown. Nothing
//! that arrives on the channel can stop the loop: undecodable frames are
//! logged and skipped, and a credential rejection only ends the session.
//!
//! # Example
//!
//! ```rust
//! use smart_can::services::connection::Backoff;
//! use std::time::Duration;
//!
//! let backoff = Backoff::new(Duration::from_secs(600));
//! let (wait, backoff) = backoff.fail();
//! assert_eq!(wait, Duration::from_secs(1));
//! assert_eq!(backoff.cooldown(), Duration::from_secs(2));
//! assert_eq!(backoff.reset().cooldown(), Duration::from_secs(1));
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::time::sleep;

use crate::config::DeviceCredentials;
use crate::error::ConnectionError;
use crate::messages::{
    decode_frame, echo_frame, identify_frame, is_rejected_credentials, resolve_rotate_target,
    ServerCommand,
};
use crate::queue::MoveQueue;
use crate::traits::{CommandChannel, Connector};
use crate::CommandSource;

// ============================================================================
// Backoff
// ============================================================================

/// Reconnect cooldown, threaded through attempts by value.
///
/// Starts at 1 s and doubles on every consecutive failure up to a cap. After
/// `n` consecutive failures the cooldown is `min(2^n s, cap)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    cooldown: Duration,
    max: Duration,
}

impl Backoff {
    /// Cooldown after a successful connection
    pub const INITIAL: Duration = Duration::from_secs(1);

    /// Fresh backoff capped at `max`.
    pub fn new(max: Duration) -> Self {
        Self {
            cooldown: Self::INITIAL.min(max),
            max,
        }
    }

    /// Current cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Record a failed attempt: returns how long to wait now and the state
    /// for the next attempt.
    pub fn fail(self) -> (Duration, Backoff) {
        let next = self.cooldown.saturating_mul(2).min(self.max);
        (
            self.cooldown,
            Backoff {
                cooldown: next,
                max: self.max,
            },
        )
    }

    /// Record a successful connection.
    pub fn reset(self) -> Backoff {
        Backoff::new(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

// ============================================================================
// Connection manager
// ============================================================================

/// Where the manager is in its connect cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; waiting out the cooldown or about to connect.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// A session is open and frames are being served.
    Connected,
}

/// What one attempt achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// True if the attempt reached [`ConnectionState::Connected`].
    pub connected: bool,
    /// How the attempt ended. `Ok` means the server closed the session.
    pub result: Result<(), ConnectionError>,
}

/// What handling one frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// A reply was sent.
    Replied,
    /// A move to this bin was queued.
    Queued(u8),
    /// The frame was logged.
    Logged,
    /// The frame was discarded.
    Ignored,
}

/// Keeps the device connected to the server and dispatches its commands.
pub struct ConnectionManager<C> {
    connector: C,
    url: String,
    credentials: DeviceCredentials,
    categories: BTreeMap<String, u8>,
    queue: MoveQueue,
    max_cooldown: Duration,
    state: ConnectionState,
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager for `url` that pushes rotate commands onto `queue`.
    pub fn new(
        connector: C,
        url: impl Into<String>,
        credentials: DeviceCredentials,
        queue: MoveQueue,
    ) -> Self {
        Self {
            connector,
            url: url.into(),
            credentials,
            categories: BTreeMap::new(),
            queue,
            max_cooldown: Duration::from_secs(600),
            state: ConnectionState::Disconnected,
        }
    }

    /// Category identifier to bin table for rotate commands.
    pub fn with_categories(mut self, categories: BTreeMap<String, u8>) -> Self {
        self.categories = categories;
        self
    }

    /// Cap on the reconnect cooldown.
    pub fn with_max_cooldown(mut self, max: Duration) -> Self {
        self.max_cooldown = max;
        self
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect, serve, reconnect. Never returns.
    pub async fn run(&mut self) {
        let mut backoff = Backoff::new(self.max_cooldown);
        loop {
            backoff = self.attempt(backoff).await;
        }
    }

    /// One attempt followed by its cooldown. Returns the backoff for the next
    /// attempt.
    pub async fn attempt(&mut self, backoff: Backoff) -> Backoff {
        let report = self.session().await;
        let (wait, next) = if report.connected {
            let fresh = backoff.reset();
            (fresh.cooldown(), fresh)
        } else {
            backoff.fail()
        };
        info!("Reconnecting in {}s", wait.as_secs());
        sleep(wait).await;
        next
    }

    /// Connect once and serve frames until the session ends.
    pub async fn session(&mut self) -> SessionReport {
        self.state = ConnectionState::Connecting;
        info!("Connecting to {}", self.url);

        let mut channel = match self.connector.connect(&self.url).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("{e}");
                self.state = ConnectionState::Disconnected;
                return SessionReport {
                    connected: false,
                    result: Err(e),
                };
            }
        };

        self.state = ConnectionState::Connected;
        info!("Connected to {}", self.url);
        let result = self.serve(&mut channel).await;
        self.state = ConnectionState::Disconnected;

        match &result {
            Ok(()) => info!("Server closed the connection"),
            Err(e) => warn!("Connection lost: {e}"),
        }
        SessionReport {
            connected: true,
            result,
        }
    }

    async fn serve(&mut self, channel: &mut C::Channel) -> Result<(), ConnectionError> {
        self.send_credentials(channel).await?;
        while let Some(frame) = channel.recv().await {
            let frame = frame?;
            self.handle_frame(channel, &frame).await?;
        }
        Ok(())
    }

    async fn send_credentials(&self, channel: &mut C::Channel) -> Result<(), ConnectionError> {
        let password = self.credentials.password.as_deref().unwrap_or_default();
        match identify_frame(&self.credentials.username(), password) {
            Ok(frame) => {
                debug!("Identifying as {}", self.credentials.username());
                channel.send(frame).await
            }
            Err(e) => {
                error!("Could not encode credentials: {e}");
                Ok(())
            }
        }
    }

    /// Dispatch one text frame.
    ///
    /// Only transport failures and credential rejections are errors; both end
    /// the session.
    pub async fn handle_frame(
        &mut self,
        channel: &mut C::Channel,
        frame: &str,
    ) -> Result<FrameAction, ConnectionError> {
        debug!("<- {frame}");
        let command = match decode_frame(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("Discarding frame: {e}");
                return Ok(FrameAction::Ignored);
            }
        };
        debug!("Handling '{}'", command.name());

        match command {
            ServerCommand::Identify => {
                self.send_credentials(channel).await?;
                Ok(FrameAction::Replied)
            }
            ServerCommand::Echo { message } => match echo_frame(&message) {
                Ok(reply) => {
                    channel.send(reply).await?;
                    Ok(FrameAction::Replied)
                }
                Err(e) => {
                    warn!("Cannot echo: {e}");
                    Ok(FrameAction::Ignored)
                }
            },
            ServerCommand::Info { message } => {
                info!("Server: {}", text(&message));
                Ok(FrameAction::Logged)
            }
            ServerCommand::Rotate { position, category } => {
                let bin = match resolve_rotate_target(
                    position.as_ref(),
                    category.as_ref(),
                    &self.categories,
                ) {
                    Ok(bin) => bin,
                    Err(e) => {
                        warn!("Ignoring rotate: {e}");
                        return Ok(FrameAction::Ignored);
                    }
                };
                match self.queue.push(bin, CommandSource::Remote) {
                    Ok(()) => {
                        info!("Queued move to bin #{bin}");
                        Ok(FrameAction::Queued(bin))
                    }
                    Err(e) => {
                        error!("Dropping rotate to bin #{bin}: {e}");
                        Ok(FrameAction::Ignored)
                    }
                }
            }
            ServerCommand::Error { code } => {
                if is_rejected_credentials(&code) {
                    error!("Server rejected credentials ({})", text(&code));
                    Err(ConnectionError::Rejected(text(&code).into_owned()))
                } else {
                    warn!("Server error: {}", text(&code));
                    Ok(FrameAction::Logged)
                }
            }
        }
    }
}

fn text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(600));
        let mut waits = Vec::new();
        for _ in 0..12 {
            let (wait, next) = backoff.fail();
            waits.push(wait.as_secs());
            backoff = next;
        }
        assert_eq!(
            waits,
            vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 600, 600]
        );
    }

    #[test]
    fn backoff_state_after_n_failures() {
        let mut backoff = Backoff::default();
        for n in 1..=12u32 {
            backoff = backoff.fail().1;
            let expected = 2u64.pow(n).min(600);
            assert_eq!(backoff.cooldown(), Duration::from_secs(expected));
        }
    }

    #[test]
    fn backoff_reset_after_success() {
        let backoff = Backoff::default().fail().1.fail().1.fail().1;
        assert_eq!(backoff.cooldown(), Duration::from_secs(8));
        assert_eq!(backoff.reset().cooldown(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_small_cap() {
        let backoff = Backoff::new(Duration::from_millis(500));
        assert_eq!(backoff.cooldown(), Duration::from_millis(500));
        assert_eq!(backoff.fail().1.cooldown(), Duration::from_millis(500));
    }

    #[test]
    fn text_unwraps_strings() {
        assert_eq!(text(&Value::String("hi".into())), "hi");
        assert_eq!(text(&serde_json::json!(401)), "401");
    }
}
