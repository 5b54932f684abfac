//! Scoped ownership of a board binding.

use core::ops::Deref;

use log::info;

use crate::traits::Platform;

/// Holds a [`Platform`] for the life of the process and releases it on drop.
///
/// Releasing drives every motor output low (OFF) and detaches interrupts, so
/// the lid motors stop on every exit path: normal return, `?` propagation,
/// Ctrl-C, or a panic unwinding through `main`.
///
/// ```rust
/// use smart_can::hal::{HardwareSession, MockGpio};
/// use smart_can::traits::{DigitalOutputs, PinState};
///
/// let gpio = MockGpio::new();
/// {
///     let session = HardwareSession::new(gpio.clone());
///     session.write_output(3, PinState::High).unwrap();
/// }
/// assert!(gpio.is_released());
/// assert_eq!(gpio.level(3), Some(PinState::Low));
/// ```
#[derive(Debug)]
pub struct HardwareSession<P: Platform> {
    platform: P,
}

impl<P: Platform> HardwareSession<P> {
    /// Take ownership of `platform`.
    pub fn new(platform: P) -> Self {
        Self { platform }
    }

    /// The wrapped platform
    pub fn platform(&self) -> &P {
        &self.platform
    }
}

impl<P: Platform> Deref for HardwareSession<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.platform
    }
}

impl<P: Platform> Drop for HardwareSession<P> {
    fn drop(&mut self) {
        self.platform.release();
        info!("Hardware released, motor outputs off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockGpio;
    use crate::traits::{DigitalOutputs, PinState};

    #[test]
    fn release_runs_on_early_return() {
        fn fails_midway(gpio: MockGpio) -> Result<(), &'static str> {
            let session = HardwareSession::new(gpio);
            session.write_output(27, PinState::High).map_err(|_| "write")?;
            Err("startup failed")
        }

        let gpio = MockGpio::new();
        assert!(fails_midway(gpio.clone()).is_err());
        assert!(gpio.is_released());
        assert_eq!(gpio.level(27), Some(PinState::Low));
    }

    #[test]
    fn not_released_while_held() {
        let gpio = MockGpio::new();
        let session = HardwareSession::new(gpio.clone());
        assert!(!gpio.is_released());
        assert!(!session.platform().is_released());
    }
}
