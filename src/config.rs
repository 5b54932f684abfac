//! Controller configuration and device credentials.
//!
//! Uses `heapless::String` for bounded config strings, so a malformed config
//! file cannot grow them without limit. Every struct has defaults matching the
//! production wiring and `with_*` builder methods.
//!
//! # Example
//!
//! ```rust
//! use smart_can::config::{Config, LidConfig, ServerConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.lid.num_bins, 3);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_server(ServerConfig::default().with_url("ws://can.local:8000/ws/"))
//!     .with_lid(LidConfig::default().with_dwell_ms(5_000));
//! assert_eq!(config.server.url.as_str(), "ws://can.local:8000/ws/");
//! ```
//!
//! # Pin numbering
//!
//! All pin numbers are BCM GPIO numbers.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use heapless::String as HString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum length for longer config strings (URLs)
pub const MAX_LONG_STRING: usize = 128;

/// Maximum number of pedal bindings
pub const MAX_PEDALS: usize = 8;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

fn bounded<const N: usize>(s: &str) -> HString<N> {
    let mut hs = HString::new();
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= N)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    bounded(s)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete controller configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server connection settings
    pub server: ServerConfig,
    /// Bin layout, dwell and motor wiring
    pub lid: LidConfig,
    /// Motion timing
    pub motion: MotionConfig,
    /// Position sensor selection and wiring
    pub sensor: SensorConfig,
    /// Pedal inputs
    pub pedals: PedalConfig,
}

impl Config {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// Set server configuration
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Set lid configuration
    pub fn with_lid(mut self, lid: LidConfig) -> Self {
        self.lid = lid;
        self
    }

    /// Set motion configuration
    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    /// Set sensor configuration
    pub fn with_sensor(mut self, sensor: SensorConfig) -> Self {
        self.sensor = sensor;
        self
    }

    /// Set pedal configuration
    pub fn with_pedals(mut self, pedals: PedalConfig) -> Self {
        self.pedals = pedals;
        self
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: display,
        source,
    })
}

// ============================================================================
// Server Config
// ============================================================================

/// Websocket server configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Websocket endpoint
    pub url: LongString,
    /// Upper bound on the reconnect cooldown in seconds
    pub max_cooldown_secs: u32,
    /// Category identifier to bin table for `rotate {"category": ...}`
    pub categories: BTreeMap<String, u8>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: long_string("ws://localhost:8000/ws/"),
            max_cooldown_secs: 600,
            categories: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Set the websocket endpoint
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = long_string(url);
        self
    }

    /// Set the reconnect cooldown cap
    pub fn with_max_cooldown_secs(mut self, secs: u32) -> Self {
        self.max_cooldown_secs = secs;
        self
    }

    /// Assign a bin to a category identifier
    pub fn with_category(mut self, category: &str, bin: u8) -> Self {
        self.categories.insert(category.to_string(), bin);
        self
    }

    /// Reconnect cooldown cap as a duration
    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_cooldown_secs))
    }
}

// ============================================================================
// Lid Config
// ============================================================================

/// Forward/reverse enable pins of one motor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    /// Forward-enable output
    pub forward: u8,
    /// Reverse-enable output
    pub reverse: u8,
}

impl MotorPins {
    /// Create a pin pair
    pub const fn new(forward: u8, reverse: u8) -> Self {
        Self { forward, reverse }
    }
}

/// Lid layout and motor wiring
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidConfig {
    /// Number of bins behind the lid
    pub num_bins: u8,
    /// How long an opening stays open, in milliseconds
    pub dwell_ms: u32,
    /// Top lid motor
    pub top: MotorPins,
    /// Bottom lid motor
    pub bottom: MotorPins,
}

impl Default for LidConfig {
    fn default() -> Self {
        Self {
            num_bins: 3,
            dwell_ms: 10_000,
            top: MotorPins::new(3, 4),
            bottom: MotorPins::new(27, 22),
        }
    }
}

impl LidConfig {
    /// Set the number of bins
    pub fn with_num_bins(mut self, num_bins: u8) -> Self {
        self.num_bins = num_bins;
        self
    }

    /// Set the dwell time
    pub fn with_dwell_ms(mut self, ms: u32) -> Self {
        self.dwell_ms = ms;
        self
    }

    /// Set both motor pin pairs
    pub fn with_motors(mut self, top: MotorPins, bottom: MotorPins) -> Self {
        self.top = top;
        self.bottom = bottom;
        self
    }

    /// Dwell time as a duration
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(u64::from(self.dwell_ms))
    }
}

// ============================================================================
// Motion Config
// ============================================================================

/// Time slicing of motor moves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Length of the first slice of a move, before the first position check
    pub initial_slice_ms: u32,
    /// Length of every later slice
    pub slice_ms: u32,
    /// Sleep granularity inside a slice
    pub poll_ms: u32,
    /// Optional cap on a single move; unset means unbounded
    pub max_move_ms: Option<u32>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            initial_slice_ms: 500,
            slice_ms: 100,
            poll_ms: 100,
            max_move_ms: None,
        }
    }
}

impl MotionConfig {
    /// Set the initial slice length
    pub fn with_initial_slice_ms(mut self, ms: u32) -> Self {
        self.initial_slice_ms = ms;
        self
    }

    /// Set the slice length
    pub fn with_slice_ms(mut self, ms: u32) -> Self {
        self.slice_ms = ms;
        self
    }

    /// Set the sleep granularity
    pub fn with_poll_ms(mut self, ms: u32) -> Self {
        self.poll_ms = ms.max(1);
        self
    }

    /// Cap the duration of a single move
    pub fn with_max_move_ms(mut self, ms: u32) -> Self {
        self.max_move_ms = Some(ms);
        self
    }

    pub(crate) fn initial_slice(&self) -> Duration {
        Duration::from_millis(u64::from(self.initial_slice_ms))
    }

    pub(crate) fn slice(&self) -> Duration {
        Duration::from_millis(u64::from(self.slice_ms))
    }

    pub(crate) fn poll(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_ms.max(1)))
    }

    pub(crate) fn max_move(&self) -> Option<Duration> {
        self.max_move_ms
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }
}

// ============================================================================
// Sensor Config
// ============================================================================

/// Which position sensor is fitted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Interrupt-counted rotary encoders
    #[default]
    Encoder,
    /// Resistor dividers on an MCP3008
    Resistor,
}

/// Wiring and gearing of one rotary encoder
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderPins {
    /// Pin whose rising edge counts up
    pub ccw: u8,
    /// Pin whose falling edge counts down
    pub cw: u8,
    /// Encoder shaft turns per lid turn
    pub gear_ratio: f32,
}

/// Position sensor configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Fitted sensor type
    pub kind: SensorKind,
    /// Encoder steps per encoder revolution
    pub steps_per_revolution: u32,
    /// Top lid encoder
    pub top_encoder: EncoderPins,
    /// Bottom lid encoder
    pub bottom_encoder: EncoderPins,
    /// ADC channel of the top lid divider
    pub top_channel: u8,
    /// ADC channel of the bottom lid divider
    pub bottom_channel: u8,
    /// Full-scale ADC reading
    pub adc_resolution: u16,
    /// Number of resistor taps around the lid
    pub divisions: u16,
    /// ADC samples per reading (median filtered)
    pub samples: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Encoder,
            steps_per_revolution: 360,
            top_encoder: EncoderPins {
                ccw: 26,
                cw: 19,
                gear_ratio: 5.934,
            },
            bottom_encoder: EncoderPins {
                ccw: 13,
                cw: 6,
                gear_ratio: 5.928,
            },
            top_channel: 0,
            bottom_channel: 1,
            adc_resolution: 1024,
            divisions: 64,
            samples: 5,
        }
    }
}

impl SensorConfig {
    /// Select the sensor type
    pub fn with_kind(mut self, kind: SensorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the number of ADC samples per reading
    pub fn with_samples(mut self, samples: u8) -> Self {
        self.samples = samples.max(1);
        self
    }

    /// Raw encoder counts per lid revolution for the given encoder
    pub fn rollover_units(&self, encoder: &EncoderPins) -> u32 {
        ((self.steps_per_revolution as f32 * encoder.gear_ratio) as u32).max(1)
    }
}

// ============================================================================
// Pedal Config
// ============================================================================

/// One pedal input and the bin it opens
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedalBinding {
    /// Input pin
    pub channel: u8,
    /// Bin opened by this pedal
    pub bin: u8,
}

/// Pedal inputs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedalConfig {
    /// Minimum spacing between accepted presses, in milliseconds
    pub debounce_ms: u32,
    /// Channel to bin table
    pub bindings: heapless::Vec<PedalBinding, MAX_PEDALS>,
}

impl Default for PedalConfig {
    fn default() -> Self {
        let mut bindings = heapless::Vec::new();
        for (channel, bin) in [(21, 0), (20, 1), (16, 2)] {
            let _ = bindings.push(PedalBinding { channel, bin });
        }
        Self {
            debounce_ms: 1000,
            bindings,
        }
    }
}

impl PedalConfig {
    /// Set the debounce interval
    pub fn with_debounce_ms(mut self, ms: u32) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Add or replace the binding for `channel`. Ignored once the table is full.
    pub fn with_binding(mut self, channel: u8, bin: u8) -> Self {
        if let Some(existing) = self.bindings.iter_mut().find(|b| b.channel == channel) {
            existing.bin = bin;
        } else {
            let _ = self.bindings.push(PedalBinding { channel, bin });
        }
        self
    }

    /// Remove every binding
    pub fn without_bindings(mut self) -> Self {
        self.bindings.clear();
        self
    }
}

// ============================================================================
// Device Credentials
// ============================================================================

/// Credentials produced by the one-time registration with the server.
///
/// Stored as JSON next to the controller:
///
/// ```json
/// {"device_id": "0d7e6f1c-...", "num_bins": 3, "password": "..."}
/// ```
///
/// The older `uuid` key is accepted in place of `device_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    /// Device UUID, hyphenated
    #[serde(alias = "uuid")]
    pub device_id: String,
    /// Number of bins the device was registered with
    #[serde(default = "default_num_bins")]
    pub num_bins: u8,
    /// Password issued by the server; absent until registration finishes
    #[serde(default)]
    pub password: Option<String>,
}

fn default_num_bins() -> u8 {
    3
}

impl DeviceCredentials {
    /// Create credentials directly
    pub fn new(device_id: impl Into<String>, num_bins: u8, password: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            num_bins,
            password: Some(password.into()),
        }
    }

    /// Load a credential file written by registration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// Load a credential file and require a completed registration.
    pub fn load_registered(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let credentials = Self::load(path)?;
        if credentials.is_registered() {
            Ok(credentials)
        } else {
            Err(ConfigError::NotRegistered(credentials.device_id))
        }
    }

    /// True once the server has issued a password
    pub fn is_registered(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Username presented to the server: the device id without hyphens
    pub fn username(&self) -> String {
        self.device_id.replace('-', "")
    }
}

// ============================================================================
// Tests
// ============================================================================
