//! Absolute position from a resistor divider read through an ADC.

use heapless::Vec;

use crate::error::HardwareError;
use crate::traits::{AnalogInput, PositionSensor};

/// Upper bound on samples taken per reading
pub const MAX_SAMPLES: usize = 15;

/// Reads the lid angle from a tapped resistor ladder.
///
/// The ladder has `divisions` evenly spaced taps around the lid. Each reading
/// takes `samples` ADC conversions, keeps the median, snaps it to the nearest
/// tap and converts the tap to degrees.
///
/// ```rust
/// use smart_can::hal::MockGpio;
/// use smart_can::sensors::ResistorReader;
/// use smart_can::traits::PositionSensor;
///
/// let adc = MockGpio::new();
/// adc.set_analog(0, 512);
/// let reader = ResistorReader::new(adc, 0);
/// assert_eq!(reader.read_degrees().unwrap(), 180.0);
/// ```
#[derive(Debug, Clone)]
pub struct ResistorReader<A> {
    adc: A,
    channel: u8,
    resolution: u16,
    divisions: u16,
    samples: u8,
}

impl<A: AnalogInput> ResistorReader<A> {
    /// 10-bit ADC, 64 taps, 5 samples per reading.
    pub fn new(adc: A, channel: u8) -> Self {
        Self {
            adc,
            channel,
            resolution: 1024,
            divisions: 64,
            samples: 5,
        }
    }

    /// Set the full-scale ADC value
    pub fn with_resolution(mut self, resolution: u16) -> Self {
        self.resolution = resolution.max(1);
        self
    }

    /// Set the number of taps around the lid
    pub fn with_divisions(mut self, divisions: u16) -> Self {
        self.divisions = divisions.max(1);
        self
    }

    /// Set the number of samples per reading, clamped to `1..=MAX_SAMPLES`
    pub fn with_samples(mut self, samples: u8) -> Self {
        self.samples = samples.clamp(1, MAX_SAMPLES as u8);
        self
    }

    /// ADC channel this reader samples
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Median of `samples` raw conversions.
    pub fn read_raw(&self) -> Result<u16, HardwareError> {
        let mut values: Vec<u16, MAX_SAMPLES> = Vec::new();
        for _ in 0..self.samples {
            let value = self.adc.read_analog(self.channel)?;
            // capacity is guaranteed by with_samples
            let _ = values.push(value);
        }
        values.sort_unstable();
        Ok(values[values.len() / 2])
    }

    /// Snap a raw ADC value to the nearest tap and convert it to degrees.
    pub fn convert_to_degrees(&self, raw: u16) -> f32 {
        let divisions = f32::from(self.divisions);
        let per_tap = f32::from(self.resolution) / divisions;
        let tap = (f32::from(raw) / per_tap).round();
        (tap / divisions * 360.0) % 360.0
    }
}

impl<A: AnalogInput> PositionSensor for ResistorReader<A> {
    fn read_degrees(&self) -> Result<f32, HardwareError> {
        let raw = self.read_raw()?;
        Ok(self.convert_to_degrees(raw))
    }
}
