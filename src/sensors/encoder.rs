//! Interrupt-counted incremental rotary encoder.
//!
//! The counter lives in atomics shared with the interrupt callbacks. Callbacks
//! run on the driver thread and only ever step the counter; everything else
//! happens on the scheduler.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::error::HardwareError;
use crate::traits::{Edge, InterruptSource, PositionSensor};

/// Blocks until a human confirms the lid is aligned at the reference mark.
pub trait AlignmentPrompt {
    /// Ask for alignment of the encoder called `name`; return once confirmed.
    fn confirm_alignment(&mut self, name: &str) -> io::Result<()>;
}

impl<F> AlignmentPrompt for F
where
    F: FnMut(&str) -> io::Result<()>,
{
    fn confirm_alignment(&mut self, name: &str) -> io::Result<()> {
        self(name)
    }
}

/// Prompts on stdout and waits for Enter on stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl AlignmentPrompt for StdinPrompt {
    fn confirm_alignment(&mut self, name: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(
            stdout,
            "Align the {name} lid opening with bin 0, then press Enter to calibrate... "
        )?;
        stdout.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

#[derive(Debug)]
struct EncoderCounter {
    raw: AtomicU32,
    rollover: u32,
    calibrated: AtomicBool,
}

impl EncoderCounter {
    fn step_up(&self) {
        let rollover = self.rollover;
        let _ = self
            .raw
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                Some((raw + 1) % rollover)
            });
    }

    fn step_down(&self) {
        let rollover = self.rollover;
        let _ = self
            .raw
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                Some((raw + rollover - 1) % rollover)
            });
    }
}

/// Rotary encoder counting quadrature edges on two pins.
///
/// A rising edge on the counter-clockwise pin counts up, a falling edge on the
/// clockwise pin counts down. The raw count wraps at `rollover` units, which
/// is one full revolution of the lid.
///
/// # Example
///
/// ```rust
/// use smart_can::hal::MockGpio;
/// use smart_can::sensors::RotaryEncoder;
/// use smart_can::traits::{Edge, PositionSensor};
///
/// let gpio = MockGpio::new();
/// let encoder = RotaryEncoder::attach(&gpio, "top", 26, 19, 360).unwrap();
/// encoder.zero();
///
/// for t in 0..90 {
///     gpio.trigger(26, Edge::Rising, t);
/// }
/// assert_eq!(encoder.read_degrees().unwrap(), 90.0);
/// ```
#[derive(Debug, Clone)]
pub struct RotaryEncoder {
    name: String,
    counter: Arc<EncoderCounter>,
}

impl RotaryEncoder {
    /// Create an encoder and register its two edge interrupts on `io`.
    pub fn attach<I: InterruptSource + ?Sized>(
        io: &I,
        name: impl Into<String>,
        ccw_pin: u8,
        cw_pin: u8,
        rollover: u32,
    ) -> Result<Self, HardwareError> {
        let encoder = Self::detached(name, rollover);

        let up = Arc::clone(&encoder.counter);
        io.register_interrupt(ccw_pin, Edge::Rising, 0, Box::new(move || up.step_up()))?;

        let down = Arc::clone(&encoder.counter);
        io.register_interrupt(cw_pin, Edge::Falling, 0, Box::new(move || down.step_down()))?;

        info!(
            "{} encoder attached (ccw pin {ccw_pin}, cw pin {cw_pin}, {rollover} units/rev)",
            encoder.name
        );
        Ok(encoder)
    }

    /// Create an encoder with no interrupts attached. Useful for simulation.
    pub fn detached(name: impl Into<String>, rollover: u32) -> Self {
        Self {
            name: name.into(),
            counter: Arc::new(EncoderCounter {
                raw: AtomicU32::new(0),
                rollover: rollover.max(1),
                calibrated: AtomicBool::new(false),
            }),
        }
    }

    /// Encoder name used in log and prompt text
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw count in `[0, rollover)`
    pub fn raw_position(&self) -> u32 {
        self.counter.raw.load(Ordering::Acquire)
    }

    /// Units per revolution
    pub fn rollover(&self) -> u32 {
        self.counter.rollover
    }

    /// True once the counter has been zeroed at the reference
    pub fn is_calibrated(&self) -> bool {
        self.counter.calibrated.load(Ordering::Acquire)
    }

    /// Ask `prompt` to confirm alignment, then zero the counter.
    ///
    /// Blocks the calling thread; run it before the scheduler starts serving
    /// commands.
    pub fn calibrate(&self, prompt: &mut dyn AlignmentPrompt) -> io::Result<()> {
        prompt.confirm_alignment(&self.name)?;
        self.zero();
        info!("{} encoder calibrated", self.name);
        Ok(())
    }

    /// Treat the current position as the reference without prompting.
    pub fn zero(&self) {
        self.counter.raw.store(0, Ordering::Release);
        self.counter.calibrated.store(true, Ordering::Release);
    }

    /// Count one step counter-clockwise, as the ccw interrupt does.
    pub fn step_ccw(&self) {
        self.counter.step_up();
    }

    /// Count one step clockwise, as the cw interrupt does.
    pub fn step_cw(&self) {
        self.counter.step_down();
    }
}

impl PositionSensor for RotaryEncoder {
    fn read_degrees(&self) -> Result<f32, HardwareError> {
        if !self.is_calibrated() {
            warn!("{} encoder read before calibration", self.name);
        }
        let raw = self.raw_position() as f32;
        Ok((raw / self.counter.rollover as f32 * 360.0) % 360.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockGpio;

    #[test]
    fn ccw_rising_counts_up_cw_falling_counts_down() {
        let gpio = MockGpio::new();
        let encoder = RotaryEncoder::attach(&gpio, "top", 26, 19, 100).unwrap();

        gpio.trigger(26, Edge::Rising, 0);
        gpio.trigger(26, Edge::Rising, 1);
        gpio.trigger(26, Edge::Falling, 2);
        assert_eq!(encoder.raw_position(), 2);

        gpio.trigger(19, Edge::Falling, 3);
        gpio.trigger(19, Edge::Rising, 4);
        assert_eq!(encoder.raw_position(), 1);
    }

    #[test]
    fn counter_wraps_both_ways() {
        let encoder = RotaryEncoder::detached("bottom", 4);
        encoder.step_cw();
        assert_eq!(encoder.raw_position(), 3);
        encoder.step_ccw();
        encoder.step_ccw();
        assert_eq!(encoder.raw_position(), 1);
    }

    #[test]
    fn degrees_scale_with_rollover() {
        let encoder = RotaryEncoder::detached("top", 2136);
        encoder.zero();
        for _ in 0..534 {
            encoder.step_ccw();
        }
        assert!((encoder.read_degrees().unwrap() - 90.0).abs() < 0.01);
    }

    #[test]
    fn uncalibrated_read_still_returns_value() {
        let encoder = RotaryEncoder::detached("top", 360);
        encoder.step_ccw();
        assert!(!encoder.is_calibrated());
        assert!((encoder.read_degrees().unwrap() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn calibrate_zeroes_after_confirmation() {
        let encoder = RotaryEncoder::detached("bottom", 360);
        for _ in 0..45 {
            encoder.step_ccw();
        }

        let mut asked = Vec::new();
        let mut prompt = |name: &str| -> io::Result<()> {
            asked.push(name.to_string());
            Ok(())
        };
        encoder.calibrate(&mut prompt).unwrap();

        assert_eq!(asked, vec!["bottom".to_string()]);
        assert!(encoder.is_calibrated());
        assert_eq!(encoder.raw_position(), 0);
    }

    #[test]
    fn failed_prompt_leaves_encoder_uncalibrated() {
        let encoder = RotaryEncoder::detached("top", 360);
        encoder.step_ccw();
        let mut prompt = |_: &str| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"))
        };
        assert!(encoder.calibrate(&mut prompt).is_err());
        assert!(!encoder.is_calibrated());
        assert_eq!(encoder.raw_position(), 1);
    }
}
