//! Raspberry Pi binding using `rppal`.
//!
//! | Capability | Peripheral |
//! |------------|------------|
//! | Digital outputs | GPIO, configured as outputs (initially low) on first write |
//! | Interrupts | GPIO inputs with pull-down, `rppal` async interrupts with debounce |
//! | Analog input | MCP3008 10-bit ADC on SPI0/CE0 |
//!
//! Pin numbers are BCM numbers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{info, warn};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::error::HardwareError;
use crate::traits::{
    AnalogInput, DigitalOutputs, Edge, InterruptCallback, InterruptSource, PinState, Platform,
};

/// SPI clock for the MCP3008
const ADC_CLOCK_HZ: u32 = 1_000_000;

/// Highest MCP3008 channel
const ADC_MAX_CHANNEL: u8 = 7;

fn driver<E: std::fmt::Display>(e: E) -> HardwareError {
    HardwareError::Driver(e.to_string())
}

struct RpiState {
    gpio: Gpio,
    outputs: BTreeMap<u8, OutputPin>,
    inputs: BTreeMap<u8, InputPin>,
    adc: Option<Spi>,
}

/// Raspberry Pi GPIO and MCP3008 access.
///
/// Cheap to clone; every clone drives the same pins.
#[derive(Clone)]
pub struct RpiPlatform {
    inner: Arc<Mutex<RpiState>>,
}

impl core::fmt::Debug for RpiPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("RpiPlatform")
            .field("outputs", &state.outputs.keys().collect::<Vec<_>>())
            .field("inputs", &state.inputs.keys().collect::<Vec<_>>())
            .field("adc", &state.adc.is_some())
            .finish()
    }
}

impl RpiPlatform {
    /// Open the GPIO controller. The ADC is not opened.
    pub fn new() -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(driver)?;
        info!("GPIO opened");
        Ok(Self {
            inner: Arc::new(Mutex::new(RpiState {
                gpio,
                outputs: BTreeMap::new(),
                inputs: BTreeMap::new(),
                adc: None,
            })),
        })
    }

    /// Also open the MCP3008 on SPI0, chip select 0.
    pub fn with_adc(self) -> Result<Self, HardwareError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, ADC_CLOCK_HZ, Mode::Mode0).map_err(driver)?;
        self.lock().adc = Some(spi);
        info!("MCP3008 opened on SPI0/CE0");
        Ok(self)
    }

    fn lock(&self) -> MutexGuard<'_, RpiState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn level(state: PinState) -> Level {
    match state {
        PinState::High => Level::High,
        PinState::Low => Level::Low,
    }
}

fn trigger(edge: Edge) -> Trigger {
    match edge {
        Edge::Rising => Trigger::RisingEdge,
        Edge::Falling => Trigger::FallingEdge,
        Edge::Both => Trigger::Both,
    }
}

impl DigitalOutputs for RpiPlatform {
    fn write_output(&self, pin: u8, state: PinState) -> Result<(), HardwareError> {
        let mut guard = self.lock();
        let RpiState { gpio, outputs, .. } = &mut *guard;
        if !outputs.contains_key(&pin) {
            let output = gpio
                .get(pin)
                .map_err(|_| HardwareError::UnknownPin(pin))?
                .into_output_low();
            outputs.insert(pin, output);
        }
        if let Some(output) = outputs.get_mut(&pin) {
            output.write(level(state));
        }
        Ok(())
    }
}

impl InterruptSource for RpiPlatform {
    fn register_interrupt(
        &self,
        pin: u8,
        edge: Edge,
        debounce_ms: u32,
        mut callback: InterruptCallback,
    ) -> Result<(), HardwareError> {
        let mut guard = self.lock();
        let RpiState { gpio, inputs, .. } = &mut *guard;
        let mut input = gpio
            .get(pin)
            .map_err(|_| HardwareError::UnknownPin(pin))?
            .into_input_pulldown();
        let debounce = (debounce_ms > 0).then(|| Duration::from_millis(u64::from(debounce_ms)));
        input
            .set_async_interrupt(trigger(edge), debounce, move |_event| callback())
            .map_err(driver)?;
        if inputs.insert(pin, input).is_some() {
            warn!("Interrupt on pin {pin} replaced");
        }
        Ok(())
    }
}

impl AnalogInput for RpiPlatform {
    fn read_analog(&self, channel: u8) -> Result<u16, HardwareError> {
        if channel > ADC_MAX_CHANNEL {
            return Err(HardwareError::UnknownChannel(channel));
        }
        let mut guard = self.lock();
        let spi = guard
            .adc
            .as_mut()
            .ok_or_else(|| HardwareError::Driver("ADC not opened".into()))?;

        // start bit, single-ended mode + channel, padding
        let request = [1u8, (8 + channel) << 4, 0];
        let mut reply = [0u8; 3];
        spi.transfer(&mut reply, &request).map_err(driver)?;
        Ok((u16::from(reply[1] & 0x03) << 8) | u16::from(reply[2]))
    }
}

impl Platform for RpiPlatform {
    fn release(&self) {
        let mut state = self.lock();
        for output in state.outputs.values_mut() {
            output.set_low();
        }
        for input in state.inputs.values_mut() {
            let _ = input.clear_async_interrupt();
        }
        state.inputs.clear();
    }
}
