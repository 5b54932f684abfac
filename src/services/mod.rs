//! Long-running services that feed the move queue.
//!
//! - `connection`: persistent server connection with reconnect backoff
//! - `pedals`: interrupt-to-scheduler bridge for pedal presses
//! - `ws` feature: websocket transport for the connection manager
//!
//! Both producers share one [`MoveQueue`](crate::queue::MoveQueue):
//!
//! ```ignore
//! use smart_can::queue::move_queue;
//! use smart_can::services::{ConnectionManager, HardwareEventBridge, WsConnector};
//!
//! let (queue, receiver) = move_queue();
//! let mut manager = ConnectionManager::new(WsConnector::new(), url, credentials, queue.clone());
//! let mut bridge = HardwareEventBridge::from_config(&config.pedals, queue);
//! bridge.attach(&gpio, config.pedals.debounce_ms)?;
//! ```

pub mod connection;
pub mod pedals;

#[cfg(feature = "ws")]
pub mod ws;

// Re-exports
pub use connection::*;
pub use pedals::*;

#[cfg(feature = "ws")]
pub use ws::*;
