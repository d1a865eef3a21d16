//! Gateway over the Telldus `tdtool` command-line tool
//!
//! Lists devices and sensors by parsing tdtool's tab separated output and
//! issues on/off/dim commands. Every listing spawns a fresh subprocess
//! unless a snapshot TTL is configured.

pub mod parser;
pub mod records;
pub mod runner;

pub use parser::{parse_records, RawRecord};
pub use records::{merge_with_conf, DeviceRecord, SensorRecord, STALE_AFTER_SECS};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};

use crate::config::tellstick_conf::TellstickConf;
use crate::config::ToolConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Marker tdtool prints when a control command went through.
///
/// tdtool gives no structured acknowledgement, so control success is a
/// substring match on this exact text.
pub const SUCCESS_MARKER: &str = "Success";

/// Convert a 0-100 percentage to tdtool's 0-255 dim level
pub fn percentage_to_bits(percentage: f64) -> u8 {
    (percentage.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u8
}

/// Convert a 0-255 dim level to a 0-100 percentage
pub fn bits_to_percentage(bits: u8) -> u8 {
    (f64::from(bits) * 100.0 / 255.0).round() as u8
}

/// Whether control command output reports success
pub fn is_success(output: &str) -> bool {
    output.contains(SUCCESS_MARKER)
}

/// Operations accessories need from the device layer
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// All devices, merged with the static configuration
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>>;

    /// All sensors
    async fn list_sensors(&self) -> Result<Vec<SensorRecord>>;

    /// First device with `id`, or `None`
    async fn device(&self, id: i64) -> Result<Option<DeviceRecord>> {
        Ok(self.list_devices().await?.into_iter().find(|d| d.id == id))
    }

    /// Freshest sensor row with `id`, or `None`
    async fn sensor(&self, id: i64) -> Result<Option<SensorRecord>> {
        Ok(records::freshest(self.list_sensors().await?, id))
    }

    /// Turn a device on; returns raw tdtool output
    async fn on(&self, id: i64) -> Result<String>;

    /// Turn a device off; returns raw tdtool output
    async fn off(&self, id: i64) -> Result<String>;

    /// Dim a device to `level` on the 0-255 scale; returns raw tdtool output
    async fn dim(&self, level: u8, id: i64) -> Result<String>;
}

#[derive(Debug)]
struct Snapshot<T> {
    taken_at: Instant,
    records: Vec<T>,
}

/// Short-lived listing cache shared by callers within one polling cycle
#[derive(Debug)]
struct SnapshotCache {
    ttl: Duration,
    devices: RwLock<Option<Snapshot<DeviceRecord>>>,
    sensors: RwLock<Option<Snapshot<SensorRecord>>>,
}

impl SnapshotCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            devices: RwLock::new(None),
            sensors: RwLock::new(None),
        }
    }

    async fn fresh<T: Clone>(&self, slot: &RwLock<Option<Snapshot<T>>>) -> Option<Vec<T>> {
        slot.read()
            .await
            .as_ref()
            .filter(|s| s.taken_at.elapsed() <= self.ttl)
            .map(|s| s.records.clone())
    }

    async fn store<T>(slot: &RwLock<Option<Snapshot<T>>>, records: Vec<T>) {
        *slot.write().await = Some(Snapshot {
            taken_at: Instant::now(),
            records,
        });
    }
}

/// tdtool-backed gateway
pub struct TdTool<R: CommandRunner = SystemRunner> {
    runner: R,
    program: String,
    conf_path: PathBuf,
    command_timeout: Option<Duration>,
    installed: OnceCell<bool>,
    snapshot: Option<SnapshotCache>,
}

impl TdTool<SystemRunner> {
    /// Gateway running the real tdtool binary
    pub fn system(config: &ToolConfig) -> Self {
        Self::new(SystemRunner, config)
    }
}

impl<R: CommandRunner> TdTool<R> {
    /// Create a gateway using `runner` for subprocesses
    pub fn new(runner: R, config: &ToolConfig) -> Self {
        Self {
            runner,
            program: config.program.clone(),
            conf_path: config.conf_path.clone(),
            command_timeout: config.command_timeout,
            installed: OnceCell::new(),
            snapshot: config
                .snapshot_ttl
                .filter(|ttl| !ttl.is_zero())
                .map(SnapshotCache::new),
        }
    }

    /// Verify tdtool can be resolved on this system
    ///
    /// Resolved with `command -v`, the program passed as a positional
    /// argument so the shell never interprets it. The outcome is remembered,
    /// so a missing tool is reported without checking again.
    pub async fn ensure_installed(&self) -> Result<()> {
        let installed = self
            .installed
            .get_or_try_init(|| async {
                debug!("Checking whether tdtool is installed (command -v {})...", self.program);
                let args = [
                    "-c".to_string(),
                    "command -v \"$1\"".to_string(),
                    "sh".to_string(),
                    self.program.clone(),
                ];
                let output = self.runner.execute("sh", &args).await?;
                let present = output.success && !output.stdout.trim().is_empty();
                if present {
                    debug!("\"{}\" is present on system.", self.program);
                } else {
                    warn!(
                        "\"{}\" does not seem to be installed, but is required by this bridge.",
                        self.program
                    );
                }
                Ok::<bool, BridgeError>(present)
            })
            .await?;

        if *installed {
            Ok(())
        } else {
            Err(BridgeError::ToolUnavailable(self.program.clone()))
        }
    }

    async fn execute(&self, args: Vec<String>) -> Result<String> {
        debug!("Running {} {}", self.program, args.join(" "));

        let invocation = self.runner.execute(&self.program, &args);
        let result = match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| {
                BridgeError::timeout(format!(
                    "{} {} did not finish within {:?}",
                    self.program,
                    args.join(" "),
                    limit
                ))
            })?,
            None => invocation.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BridgeError::ToolUnavailable(self.program.clone()));
            }
            Err(e) => return Err(e),
        };

        if output.success {
            Ok(output.stdout)
        } else {
            Err(BridgeError::tool_execution(output.stderr))
        }
    }

    /// Run `tdtool <command> <target>` and return its stdout
    ///
    /// Treated as a state change: any device snapshot is dropped.
    pub async fn run(&self, command: &str, target: impl ToString + Send) -> Result<String> {
        self.control(vec![command.to_string(), target.to_string()])
            .await
    }

    async fn fetch_devices(&self) -> Result<Vec<DeviceRecord>> {
        self.ensure_installed().await?;
        let output = self.execute(vec!["--list-devices".to_string()]).await?;
        let devices: Vec<DeviceRecord> = parse_records(&output).into_iter().map(Into::into).collect();
        info!(
            "\"{} --list-devices\" lists {}",
            self.program,
            quoted(devices.iter().map(|d| d.name().unwrap_or_default().to_string()))
        );

        let conf = TellstickConf::load(&self.conf_path).await?;
        debug!(
            "\"{}\" lists {}",
            self.conf_path.display(),
            quoted(conf.devices.iter().map(|d| {
                d.fields.get("name").cloned().unwrap_or_default()
            }))
        );

        Ok(merge_with_conf(devices, &conf))
    }

    async fn fetch_sensors(&self) -> Result<Vec<SensorRecord>> {
        self.ensure_installed().await?;
        let output = self.execute(vec!["--list-sensors".to_string()]).await?;
        let sensors: Vec<SensorRecord> = parse_records(&output).into_iter().map(Into::into).collect();
        info!(
            "\"{} --list-sensors\" lists {}",
            self.program,
            quoted(sensors.iter().map(|s| s.id.to_string()))
        );
        Ok(sensors)
    }

    async fn invalidate_devices(&self) {
        if let Some(cache) = &self.snapshot {
            *cache.devices.write().await = None;
        }
    }

    async fn control(&self, args: Vec<String>) -> Result<String> {
        self.ensure_installed().await?;
        let output = self.execute(args).await;
        self.invalidate_devices().await;
        output
    }
}

fn quoted(names: impl Iterator<Item = String>) -> String {
    names
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl<R: CommandRunner> DeviceGateway for TdTool<R> {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        if let Some(cache) = &self.snapshot {
            if let Some(devices) = cache.fresh(&cache.devices).await {
                return Ok(devices);
            }
            let devices = self.fetch_devices().await?;
            SnapshotCache::store(&cache.devices, devices.clone()).await;
            return Ok(devices);
        }
        self.fetch_devices().await
    }

    async fn list_sensors(&self) -> Result<Vec<SensorRecord>> {
        if let Some(cache) = &self.snapshot {
            if let Some(sensors) = cache.fresh(&cache.sensors).await {
                return Ok(sensors);
            }
            let sensors = self.fetch_sensors().await?;
            SnapshotCache::store(&cache.sensors, sensors.clone()).await;
            return Ok(sensors);
        }
        self.fetch_sensors().await
    }

    async fn on(&self, id: i64) -> Result<String> {
        self.run("--on", id).await
    }

    async fn off(&self, id: i64) -> Result<String> {
        self.run("--off", id).await
    }

    async fn dim(&self, level: u8, id: i64) -> Result<String> {
        self.control(vec![
            "--dimlevel".to_string(),
            level.to_string(),
            "--dim".to_string(),
            id.to_string(),
        ])
        .await
    }
}
