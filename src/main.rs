//! tdtool-bridge command line entry point
//!
//! Runs discovery against the local tdtool and prints results as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tdtool_bridge::{
    accessory::CharacteristicValue,
    config::BridgeConfig,
    error::{BridgeError, ErrorReporter},
    logging::{init_logging, LogConfig},
    CharacteristicType, TdToolPlatform,
};
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "tdtool-bridge")]
#[command(about = "Expose Telldus tdtool devices and sensors as typed accessories")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(long, short, global = true, env = "TDTOOL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one discovery cycle and list the classified accessories
    Accessories,
    /// Raw devices, merged with tellstick.conf
    Devices,
    /// Raw sensors
    Sensors,
    /// Turn an accessory on
    On { id: i64 },
    /// Turn an accessory off
    Off { id: i64 },
    /// Dim an accessory to a percentage
    Dim { id: i64, percent: f64 },
    /// Read a characteristic, e.g. On, Brightness or CurrentTemperature
    Get { id: i64, characteristic: String },
    /// Ask an accessory to identify itself
    Identify { id: i64 },
    /// Write an example configuration file
    ExampleConfig { path: PathBuf },
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::ExampleConfig { path } = &cli.command {
        BridgeConfig::save_example(path)?;
        println!("Wrote example configuration to {}", path.display());
        return Ok(());
    }

    let config = BridgeConfig::load(cli.config.as_deref())?;

    let mut log_config = LogConfig::from_config(&config.logging);
    if cli.debug {
        log_config.level = Level::DEBUG;
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let platform = TdToolPlatform::from_config(&config);
    debug!("Platform \"{}\" ready", platform.name());

    match cli.command {
        Command::Accessories => {
            let accessories = platform.accessories().await?;
            let listing: Vec<_> = accessories
                .iter()
                .map(|a| json!({ "accessory": a, "services": a.services() }))
                .collect();
            print_json(&listing)?;
        }
        Command::Devices => print_json(&platform.gateway().list_devices().await?)?,
        Command::Sensors => print_json(&platform.gateway().list_sensors().await?)?,
        Command::On { id } => {
            let accessory = platform.accessory(id).await?;
            accessory
                .set(CharacteristicType::On, CharacteristicValue::Bool(true))
                .await?;
            print_json(&json!({ "id": id, "On": true }))?;
        }
        Command::Off { id } => {
            let accessory = platform.accessory(id).await?;
            accessory
                .set(CharacteristicType::On, CharacteristicValue::Bool(false))
                .await?;
            print_json(&json!({ "id": id, "On": false }))?;
        }
        Command::Dim { id, percent } => {
            let accessory = platform.accessory(id).await?;
            accessory
                .set(CharacteristicType::Brightness, CharacteristicValue::Number(percent))
                .await?;
            print_json(&json!({ "id": id, "Brightness": percent }))?;
        }
        Command::Get { id, characteristic } => {
            let characteristic = CharacteristicType::from_name(&characteristic)
                .with_context(|| format!("unknown characteristic {characteristic:?}"))?;
            let accessory = platform.accessory(id).await?;
            let value = accessory.get(characteristic).await?;
            print_json(&json!({ "id": id, (characteristic.to_string()): value }))?;
        }
        Command::Identify { id } => platform.accessory(id).await?.identify(),
        Command::ExampleConfig { .. } => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<BridgeError>() {
                Some(error) => {
                    ErrorReporter::log_error(error, None);
                    eprintln!("{}", ErrorReporter::format_error(error));
                }
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
