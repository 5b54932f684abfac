//! Smart can lid controller.
//!
//! Runs the whole controller on one current-thread tokio runtime: the move
//! consumer, the pedal bridge and (unless `--offline`) the server connection.
//!
//! # Usage
//!
//! On the can (Raspberry Pi):
//! ```sh
//! cargo run --release --features rpi --bin can_controller -- --credentials /etc/smart-can/credentials.json
//! ```
//!
//! On a desktop, with simulated lid shafts:
//! ```sh
//! RUST_LOG=debug cargo run --bin can_controller -- --simulate --offline
//! ```
//!
//! Ctrl-C stops the controller; every motor output is driven off on the way
//! out.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use smart_can::config::{long_string, Config, DeviceCredentials};
use smart_can::hal::{HardwareSession, MockGpio, SimulatedShaft};
use smart_can::queue::{move_queue, MoveConsumer};
use smart_can::services::{ConnectionManager, HardwareEventBridge, WsConnector};
use smart_can::traits::{DigitalOutputs, InterruptSource, PositionSensor};
use smart_can::{LidController, MotorController};

#[derive(Parser, Debug)]
#[command(name = "can_controller", version, about = "Smart can lid controller")]
struct Args {
    /// Serve pedals only; never connect to the server
    #[arg(long)]
    offline: bool,

    /// Drive simulated lid shafts instead of GPIO
    #[arg(long)]
    simulate: bool,

    /// JSON configuration file (defaults are used for missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Credentials written by device registration
    #[arg(long, default_value = "credentials.json")]
    credentials: PathBuf,

    /// Server websocket URL, overriding the configuration
    #[arg(long)]
    server: Option<String>,

    /// Take the current lid position as bin 0 without prompting
    #[arg(long)]
    skip_calibration: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(url) = &args.server {
        config.server.url = long_string(url);
    }

    let credentials = if args.offline {
        info!("Offline mode: pedals only");
        None
    } else {
        let credentials = DeviceCredentials::load_registered(&args.credentials)
            .context("device is not registered; run registration or pass --offline")?;
        if credentials.num_bins != config.lid.num_bins {
            warn!(
                "Registered with {} bins but configured for {}",
                credentials.num_bins, config.lid.num_bins
            );
        }
        Some(credentials)
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if args.simulate {
        run_simulated(&args, &config, credentials, &runtime)
    } else {
        run_hardware(&args, &config, credentials, &runtime)
    }
}

// ============================================================================
// Platforms
// ============================================================================

fn run_simulated(
    _args: &Args,
    config: &Config,
    credentials: Option<DeviceCredentials>,
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    let session = HardwareSession::new(MockGpio::new());
    let lid_config = &config.lid;

    // construct inside the runtime so shaft clocks follow tokio time
    runtime.block_on(async {
        let top = SimulatedShaft::new(lid_config.top);
        let bottom = SimulatedShaft::new(lid_config.bottom);
        let lid = LidController::new(
            MotorController::new("top", top.clone(), top, lid_config.top, lid_config.num_bins)?
                .with_motion(config.motion),
            MotorController::new(
                "bottom",
                bottom.clone(),
                bottom,
                lid_config.bottom,
                lid_config.num_bins,
            )?
            .with_motion(config.motion),
        )?;
        info!("Simulation: lid shafts simulated, pedals not wired");
        serve(lid, session.platform(), config, credentials).await
    })
}

#[cfg(feature = "rpi")]
fn run_hardware(
    args: &Args,
    config: &Config,
    credentials: Option<DeviceCredentials>,
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    use smart_can::config::SensorKind;
    use smart_can::hal::RpiPlatform;
    use smart_can::sensors::{ResistorReader, RotaryEncoder, StdinPrompt};

    let platform = match config.sensor.kind {
        SensorKind::Encoder => RpiPlatform::new()?,
        SensorKind::Resistor => RpiPlatform::new()?.with_adc()?,
    };
    let session = HardwareSession::new(platform);
    let sensor = &config.sensor;

    let (top_sensor, bottom_sensor): (Box<dyn PositionSensor>, Box<dyn PositionSensor>) =
        match sensor.kind {
            SensorKind::Encoder => {
                let (t, b) = (&sensor.top_encoder, &sensor.bottom_encoder);
                let top = RotaryEncoder::attach(
                    session.platform(),
                    "top",
                    t.ccw,
                    t.cw,
                    sensor.rollover_units(t),
                )?;
                let bottom = RotaryEncoder::attach(
                    session.platform(),
                    "bottom",
                    b.ccw,
                    b.cw,
                    sensor.rollover_units(b),
                )?;
                for encoder in [&top, &bottom] {
                    if args.skip_calibration {
                        warn!("{} encoder zeroed without alignment check", encoder.name());
                        encoder.zero();
                    } else {
                        encoder.calibrate(&mut StdinPrompt)?;
                    }
                }
                (Box::new(top), Box::new(bottom))
            }
            SensorKind::Resistor => {
                let reader = |channel| {
                    ResistorReader::new(session.platform().clone(), channel)
                        .with_resolution(sensor.adc_resolution)
                        .with_divisions(sensor.divisions)
                        .with_samples(sensor.samples)
                };
                (
                    Box::new(reader(sensor.top_channel)),
                    Box::new(reader(sensor.bottom_channel)),
                )
            }
        };

    let lid_config = &config.lid;
    let lid = LidController::new(
        MotorController::new(
            "top",
            top_sensor,
            session.platform().clone(),
            lid_config.top,
            lid_config.num_bins,
        )?
        .with_motion(config.motion),
        MotorController::new(
            "bottom",
            bottom_sensor,
            session.platform().clone(),
            lid_config.bottom,
            lid_config.num_bins,
        )?
        .with_motion(config.motion),
    )?;

    runtime.block_on(serve(lid, session.platform(), config, credentials))
}

#[cfg(not(feature = "rpi"))]
fn run_hardware(
    _args: &Args,
    _config: &Config,
    _credentials: Option<DeviceCredentials>,
    _runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    anyhow::bail!("built without the `rpi` feature; rebuild with --features rpi or pass --simulate")
}

// ============================================================================
// Scheduler
// ============================================================================

async fn serve<S, O, I>(
    mut lid: LidController<S, O>,
    io: &I,
    config: &Config,
    credentials: Option<DeviceCredentials>,
) -> anyhow::Result<()>
where
    S: PositionSensor,
    O: DigitalOutputs,
    I: InterruptSource + ?Sized,
{
    info!("Closing lid before serving commands");
    if let Err(e) = lid.close().await {
        error!("Startup close failed: {e}");
    }

    let (queue, receiver) = move_queue();

    let mut bridge = HardwareEventBridge::from_config(&config.pedals, queue.clone());
    bridge.attach(io, config.pedals.debounce_ms)?;

    let mut consumer = MoveConsumer::new(lid, receiver).with_dwell(config.lid.dwell());

    let connection = async move {
        match credentials {
            Some(credentials) => {
                let mut manager = ConnectionManager::new(
                    WsConnector::new(),
                    config.server.url.as_str(),
                    credentials,
                    queue,
                )
                .with_categories(config.server.categories.clone())
                .with_max_cooldown(config.server.max_cooldown());
                manager.run().await
            }
            None => {
                drop(queue);
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = consumer.run() => warn!("Move consumer stopped"),
        _ = connection => {}
        _ = bridge.run() => warn!("Pedal bridge stopped"),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl-C received, shutting down");
        }
    }
    Ok(())
}
