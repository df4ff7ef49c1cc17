//! scales-sensors: poll the station's environmental sensors
//!
//! Prints one JSON object per reading on stdout; logs go to stderr.
//!
//! Commands:
//! - run (default): start every configured sensor until SIGINT/SIGTERM
//! - check: validate the configuration without touching hardware
//! - config: open the config file in $EDITOR

use clap::{Parser, Subcommand};
use futures::{Stream, StreamExt};
use scales_sensors::config::Config;
use scales_sensors::shared::format_interval;
use scales_sensors::{CycleResult, ReadingStream, StopHandle};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// === CLI ===

#[derive(Parser)]
#[command(name = "scales-sensors")]
#[command(about = "Poll BME280, DS18B20 and MCP9600 sensors into JSON readings")]
struct Cli {
    /// Config file (default: ~/.config/scales-sensors/sensors.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every configured sensor until interrupted
    Run,
    /// Validate intervals, oversampling and addresses without hardware
    Check,
    /// Open the config file in your editor
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config) => {
            run_config_command(cli.config.as_deref())?;
        }
        Some(Commands::Check) => {
            init_tracing();
            run_check(&load_config(cli.config.as_deref())?)?;
        }
        Some(Commands::Run) | None => {
            init_tracing();
            run_sensors(&load_config(cli.config.as_deref())?).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// An explicit `--config` must exist and parse; the default path falls back.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {:#}", path.display(), e)),
        None => Ok(Config::load()),
    }
}

/// Open config file in user's editor
fn run_config_command(path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    // Create config dir if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create config file from template if it doesn't exist
    if !config_path.exists() {
        let template = include_str!("../sensors.toml.example");
        std::fs::write(&config_path, template)?;
        println!("Created config file: {}", config_path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "nano".to_string());

    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(&config_path)
        .status()?;

    Ok(())
}

fn run_check(config: &Config) -> anyhow::Result<()> {
    let mut failed = 0;
    for sensor in &config.sensors {
        match sensor.check() {
            Ok(polling) => println!(
                "ok    {}: every {}, {} sample(s)",
                sensor.label(),
                format_interval(polling.min_update_interval()),
                polling.oversample().count()
            ),
            Err(e) => {
                failed += 1;
                println!("error {}: {}", sensor.label(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} sensor(s) misconfigured", failed, config.sensors.len());
    }
    Ok(())
}

// === Run ===

async fn run_sensors(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Starting scales-sensors with {} configured sensor(s)", config.sensors.len());

    let streams = start_sensors(config).await;
    if streams.is_empty() {
        anyhow::bail!("No sensor could be started");
    }

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    tokio::spawn(forward_signals(shutdown_tx));

    let handles: Vec<StopHandle> = streams.iter().map(ReadingStream::stop_handle).collect();
    let mut merged = futures::stream::select_all(streams.into_iter().map(tagged));

    loop {
        tokio::select! {
            Some(signal) = shutdown_rx.recv() => {
                tracing::info!("Received {}, stopping {} sensor(s)", signal, handles.len());
                break;
            }
            next = merged.next() => match next {
                Some((_, Ok(readings))) => {
                    for reading in readings {
                        println!("{}", serde_json::to_string(&reading)?);
                    }
                }
                Some((source_id, Err(e))) => tracing::warn!("{}: {}", source_id, e),
                None => break,
            },
        }
    }

    for handle in &handles {
        handle.stop();
    }
    // Ends once every polling task has finished its in-flight cycle.
    while merged.next().await.is_some() {}

    tracing::info!("scales-sensors stopped");
    Ok(())
}

fn tagged(stream: ReadingStream) -> impl Stream<Item = (String, CycleResult)> + Unpin {
    let source_id = stream.source_id().to_string();
    stream.map(move |cycle| (source_id.clone(), cycle))
}

async fn forward_signals(shutdown: mpsc::Sender<&'static str>) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let name = tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    let _ = shutdown.send(name).await;
}

/// Construct and start every sensor; failures are logged and skipped.
#[cfg(all(feature = "linux", target_os = "linux"))]
async fn start_sensors(config: &Config) -> Vec<ReadingStream> {
    let mut buses = hardware::Buses::default();
    let mut streams = Vec::new();

    for sensor in &config.sensors {
        match buses.start(sensor).await {
            Ok(stream) => {
                tracing::info!("Started {} as {}", sensor.label(), stream.source_id());
                streams.push(stream);
            }
            Err(e) => tracing::error!("Skipping {}: {}", sensor.label(), e),
        }
    }
    streams
}

#[cfg(not(all(feature = "linux", target_os = "linux")))]
async fn start_sensors(config: &Config) -> Vec<ReadingStream> {
    for sensor in &config.sensors {
        tracing::error!("Skipping {}: built without bus drivers", sensor.label());
    }
    Vec::new()
}

#[cfg(all(feature = "linux", target_os = "linux"))]
mod hardware {
    use scales_sensors::config::{SensorConfig, SensorKind};
    use scales_sensors::linux::{LinuxI2c, SysfsOneWire};
    use scales_sensors::sensors::{bme280, Bme280, Ds18b20, Mcp9600};
    use scales_sensors::{ReadingStream, Sensor, SensorError, SharedBus};
    use std::collections::HashMap;

    /// One lock per physical bus, shared by every sensor on it.
    #[derive(Default)]
    pub struct Buses {
        i2c: HashMap<String, SharedBus<LinuxI2c>>,
        w1: HashMap<String, SharedBus<SysfsOneWire>>,
    }

    impl Buses {
        fn i2c(&mut self, path: &str) -> SharedBus<LinuxI2c> {
            self.i2c
                .entry(path.to_string())
                .or_insert_with(|| SharedBus::new(path, LinuxI2c::new(path)))
                .clone()
        }

        fn w1(&mut self, root: &str) -> SharedBus<SysfsOneWire> {
            self.w1
                .entry(root.to_string())
                .or_insert_with(|| SharedBus::new(root, SysfsOneWire::new(root)))
                .clone()
        }

        pub async fn start(&mut self, sensor: &SensorConfig) -> Result<ReadingStream, SensorError> {
            let polling = sensor.polling()?;
            let location = sensor.location.clone();
            let path = sensor.bus_path();

            let stream = match sensor.kind {
                SensorKind::Bme280 => {
                    let address = bme280::Address::try_from(sensor.i2c_address())?;
                    Bme280::new(self.i2c(path), address, location, polling)
                        .await?
                        .start()
                }
                SensorKind::Mcp9600 => {
                    Mcp9600::new(self.i2c(path), sensor.i2c_address(), location, polling)?.start()
                }
                SensorKind::Ds18b20 => {
                    let bus = self.w1(path);
                    match &sensor.device {
                        Some(device) => Ds18b20::with_device(bus, device, location, polling)?,
                        None => Ds18b20::new(bus, location, polling)?,
                    }
                    .start()
                }
            };
            Ok(stream)
        }
    }
}
