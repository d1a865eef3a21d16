//! Host-facing descriptors and injected capabilities
//!
//! Accessories describe their services as plain data; a host adapter turns
//! these into its own service/characteristic objects and routes reads and
//! writes back to [`super::Accessory::get`] and [`super::Accessory::set`].

use crate::tdtool::DeviceGateway;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Service types understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceType {
    Lightbulb,
    HumiditySensor,
    TemperatureSensor,
}

/// Characteristics the bridge reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CharacteristicType {
    On,
    Brightness,
    CurrentRelativeHumidity,
    CurrentTemperature,
}

impl CharacteristicType {
    /// Parse the host's characteristic name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "On" => Some(Self::On),
            "Brightness" => Some(Self::Brightness),
            "CurrentRelativeHumidity" => Some(Self::CurrentRelativeHumidity),
            "CurrentTemperature" => Some(Self::CurrentTemperature),
            _ => None,
        }
    }
}

impl fmt::Display for CharacteristicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Value passed through a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Number(f64),
}

impl CharacteristicValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(_) => None,
        }
    }
}

/// Value range overrides for a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CharacteristicProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
}

/// One characteristic wired into a service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicBinding {
    pub characteristic: CharacteristicType,
    pub writable: bool,
    pub props: CharacteristicProps,
}

impl CharacteristicBinding {
    pub fn read_only(characteristic: CharacteristicType) -> Self {
        Self {
            characteristic,
            writable: false,
            props: CharacteristicProps::default(),
        }
    }

    pub fn read_write(characteristic: CharacteristicType) -> Self {
        Self {
            characteristic,
            writable: true,
            props: CharacteristicProps::default(),
        }
    }

    pub fn with_min_value(mut self, min: f64) -> Self {
        self.props.min_value = Some(min);
        self
    }
}

/// A service with its wired characteristics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescriptor {
    pub service: ServiceType,
    pub characteristics: Vec<CharacteristicBinding>,
}

/// Host-visible log sink
pub trait Diagnostics: Send + Sync {
    fn log(&self, message: &str);
}

/// Diagnostics forwarded to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn log(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Diagnostics kept in memory, for inspection
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    entries: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages logged so far
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn log(&self, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(message.to_string());
        }
        tracing::info!("{}", message);
    }
}

/// Capabilities injected into accessory construction
#[derive(Clone)]
pub struct AccessoryContext {
    pub gateway: Arc<dyn DeviceGateway>,
    pub diagnostics: Arc<dyn Diagnostics>,
}

impl AccessoryContext {
    pub fn new(gateway: Arc<dyn DeviceGateway>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            gateway,
            diagnostics,
        }
    }

    /// Context logging to `tracing`
    pub fn with_tracing(gateway: Arc<dyn DeviceGateway>) -> Self {
        Self::new(gateway, Arc::new(TracingDiagnostics))
    }
}

impl fmt::Debug for AccessoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessoryContext").finish_non_exhaustive()
    }
}
