//! Two-motor lid coordination.
//!
//! The lid has a top and a bottom layer, each with one opening. The can is
//! open over a bin when both openings sit at that bin, and closed when the
//! bottom opening sits one bin behind the top one.

use log::info;

use crate::error::ControlError;
use crate::motor::MotorController;
use crate::traits::{DigitalOutputs, PositionSensor};

/// Opens and closes the lid over a bin.
///
/// Has no state of its own; open/closed follows from the two motors' last
/// commanded bins.
#[derive(Debug)]
pub struct LidController<S, O> {
    top: MotorController<S, O>,
    bottom: MotorController<S, O>,
}

impl<S: PositionSensor, O: DigitalOutputs> LidController<S, O> {
    /// Pair two motors. Both must serve the same number of bins.
    pub fn new(
        top: MotorController<S, O>,
        bottom: MotorController<S, O>,
    ) -> Result<Self, ControlError> {
        if top.num_bins() != bottom.num_bins() {
            return Err(ControlError::Configuration(format!(
                "top motor has {} bins but bottom motor has {}",
                top.num_bins(),
                bottom.num_bins()
            )));
        }
        Ok(Self { top, bottom })
    }

    /// Number of bins served
    pub fn num_bins(&self) -> u8 {
        self.top.num_bins()
    }

    /// Top layer motor
    pub fn top(&self) -> &MotorController<S, O> {
        &self.top
    }

    /// Bottom layer motor
    pub fn bottom(&self) -> &MotorController<S, O> {
        &self.bottom
    }

    /// True when both openings were last commanded to the same bin.
    pub fn is_open(&self) -> bool {
        self.top.current_bin() == self.bottom.current_bin()
    }

    /// Turn both layers to `bin` at the same time.
    ///
    /// Both moves run to completion even if one fails; the first error is
    /// returned.
    pub async fn open(&mut self, bin: u8) -> Result<(), ControlError> {
        info!("Opening bin {bin}");
        let (top, bottom) = tokio::join!(self.top.move_to_bin(bin), self.bottom.move_to_bin(bin));
        top.and(bottom)
    }

    /// Move the bottom layer one bin behind the top layer.
    pub async fn close(&mut self) -> Result<(), ControlError> {
        let num_bins = u16::from(self.num_bins());
        let bin = ((u16::from(self.top.current_bin()) + num_bins - 1) % num_bins) as u8;
        info!("Closing (bottom to bin {bin})");
        self.bottom.move_to_bin(bin).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotorPins;
    use crate::hal::{MockGpio, MockSensor};

    fn motor(name: &str, pins: MotorPins, num_bins: u8) -> MotorController<MockSensor, MockGpio> {
        MotorController::new(name, MockSensor::new(0.0), MockGpio::new(), pins, num_bins).unwrap()
    }

    #[test]
    fn mismatched_bins_rejected() {
        let err = LidController::new(
            motor("top", MotorPins::new(3, 4), 3),
            motor("bottom", MotorPins::new(27, 22), 4),
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_from_bin_zero_wraps() {
        let mut lid = LidController::new(
            motor("top", MotorPins::new(3, 4), 3),
            motor("bottom", MotorPins::new(27, 22), 3),
        )
        .unwrap();
        assert!(lid.is_open());

        lid.close().await.unwrap();
        assert_eq!(lid.top().current_bin(), 0);
        assert_eq!(lid.bottom().current_bin(), 2);
        assert!(!lid.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_open_fails_on_both() {
        let mut lid = LidController::new(
            motor("top", MotorPins::new(3, 4), 3),
            motor("bottom", MotorPins::new(27, 22), 3),
        )
        .unwrap();
        let err = lid.open(5).await.unwrap_err();
        assert_eq!(err, ControlError::BinOutOfRange { bin: 5, num_bins: 3 });
    }
}
