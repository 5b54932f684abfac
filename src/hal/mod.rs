//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`] for various platforms.
//!
//! # Available Implementations
//!
//! - `mock`: Test doubles and the simulated shaft for desktop runs
//! - `session`: Scoped platform ownership that turns everything off on drop
//! - `rpi`: Raspberry Pi GPIO + MCP3008 (requires `rpi` feature)

pub mod mock;
pub mod session;

#[cfg(feature = "rpi")]
pub mod rpi;

pub use mock::*;
pub use session::HardwareSession;

#[cfg(feature = "rpi")]
pub use rpi::RpiPlatform;
