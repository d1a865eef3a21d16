//! Discovery cycle exposed to the host
//!
//! Lists devices and sensors, names them and hands them to the classifier.

use crate::accessory::{build_accessories, Accessory, AccessoryContext, AccessorySource};
use crate::config::{BridgeConfig, StaticSensor};
use crate::error::{BridgeError, Result};
use crate::tdtool::{DeviceGateway, TdTool};
use std::sync::Arc;
use tracing::debug;

/// `Found 2 items of type "device".`, `Found no items ...`, `Found 1 item ...`
pub fn found_of_type(kind: &str, count: usize) -> String {
    let count_text = if count == 0 {
        "no".to_string()
    } else {
        count.to_string()
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("Found {count_text} item{plural} of type \"{kind}\".")
}

/// The tdtool platform
pub struct TdToolPlatform {
    name: String,
    static_sensors: Vec<StaticSensor>,
    ctx: AccessoryContext,
}

impl TdToolPlatform {
    pub fn new(config: &BridgeConfig, ctx: AccessoryContext) -> Self {
        Self {
            name: config.platform.name.clone(),
            static_sensors: config.sensors.clone(),
            ctx,
        }
    }

    /// Platform backed by the system tdtool, logging through `tracing`
    pub fn from_config(config: &BridgeConfig) -> Self {
        let gateway: Arc<dyn DeviceGateway> = Arc::new(TdTool::system(&config.tool));
        Self::new(config, AccessoryContext::with_tracing(gateway))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gateway(&self) -> &Arc<dyn DeviceGateway> {
        &self.ctx.gateway
    }

    /// Named classifier inputs: devices first, then sensors
    pub async fn sources(&self) -> Result<Vec<AccessorySource>> {
        let gateway = &self.ctx.gateway;

        let sensors = async {
            if self.static_sensors.is_empty() {
                let sensors = gateway.list_sensors().await?;
                Ok::<_, BridgeError>(sensors.iter().map(AccessorySource::from_sensor).collect::<Vec<_>>())
            } else {
                debug!(
                    "Using {} statically configured sensors",
                    self.static_sensors.len()
                );
                Ok(self
                    .static_sensors
                    .iter()
                    .map(AccessorySource::from_static)
                    .collect())
            }
        };

        let (devices, sensors) = tokio::try_join!(gateway.list_devices(), sensors)?;

        let devices: Vec<AccessorySource> = devices
            .iter()
            .filter(|d| d.is_device())
            .map(AccessorySource::from_device)
            .collect();
        self.ctx.diagnostics.log(&found_of_type("device", devices.len()));
        self.ctx.diagnostics.log(&found_of_type("sensor", sensors.len()));

        Ok(devices.into_iter().chain(sensors).collect())
    }

    /// Run one discovery cycle
    pub async fn accessories(&self) -> Result<Vec<Accessory>> {
        self.ctx.diagnostics.log("Loading devices...");
        let sources = self.sources().await?;
        Ok(build_accessories(&sources, &self.ctx))
    }

    /// Discover and pick the accessory with `id`
    pub async fn accessory(&self, id: i64) -> Result<Accessory> {
        self.accessories()
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| BridgeError::not_found(format!("accessory {id}")))
    }
}
