//! Typed views over parsed tdtool records

use super::parser::RawRecord;
use crate::config::tellstick_conf::TellstickConf;
use serde::Serialize;
use std::collections::BTreeMap;

/// Sensor readings older than this many seconds are treated as absent
pub const STALE_AFTER_SECS: u64 = 600;

/// A controllable device from `tdtool --list-devices`
///
/// All fields besides `id` are kept as text. Fields contributed by
/// `tellstick.conf` (controller, protocol, parameters) live in the same map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub id: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

/// A read-only sensor from `tdtool --list-sensors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorRecord {
    pub id: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl From<RawRecord> for DeviceRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            id: raw.id,
            fields: raw.fields,
        }
    }
}

impl From<RawRecord> for SensorRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            id: raw.id,
            fields: raw.fields,
        }
    }
}

impl DeviceRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }

    pub fn model(&self) -> Option<&str> {
        self.field("model")
    }

    /// The `type` column: `device` or `group`
    pub fn kind(&self) -> Option<&str> {
        self.field("type")
    }

    pub fn last_sent_command(&self) -> Option<&str> {
        self.field("lastsentcommand")
    }

    /// Raw dim level on the tool's 0-255 scale
    pub fn dim_level(&self) -> Option<u8> {
        self.field("dimlevel")
            .and_then(|level| level.trim().parse::<u8>().ok())
    }

    /// Whether this row describes a single device rather than a group
    pub fn is_device(&self) -> bool {
        self.kind().map_or(true, |kind| kind == "device")
    }
}

impl SensorRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }

    pub fn model(&self) -> Option<&str> {
        self.field("model")
    }

    pub fn temperature(&self) -> Option<f64> {
        self.field("temperature").and_then(parse_float)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.field("humidity").and_then(parse_float)
    }

    /// Seconds since the sensor last reported
    pub fn age(&self) -> Option<u64> {
        self.field("age").and_then(|age| age.trim().parse().ok())
    }

    /// A reading is fresh up to and including the staleness threshold
    ///
    /// Rows without an `age` column carry no evidence of staleness.
    pub fn is_fresh(&self) -> bool {
        self.age().map_or(true, |age| age <= STALE_AFTER_SECS)
    }
}

fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Merge tool-reported devices with the static configuration
///
/// Configuration fields only fill gaps: whatever tdtool reported wins.
/// Configured devices that tdtool did not list are not added.
pub fn merge_with_conf(devices: Vec<DeviceRecord>, conf: &TellstickConf) -> Vec<DeviceRecord> {
    devices
        .into_iter()
        .map(|device| match conf.device(device.id) {
            Some(configured) => {
                let mut fields = configured.flattened();
                fields.extend(device.fields);
                DeviceRecord {
                    id: device.id,
                    fields,
                }
            }
            None => device,
        })
        .collect()
}

/// Pick the freshest of the sensor rows matching `id`
pub fn freshest(sensors: Vec<SensorRecord>, id: i64) -> Option<SensorRecord> {
    sensors
        .into_iter()
        .filter(|s| s.id == id)
        .min_by_key(|s| s.age().unwrap_or(0))
}
