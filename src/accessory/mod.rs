//! Accessory classification and dispatch
//!
//! Records are classified by the model type (the part of `model` before the
//! first `:`) into one of a fixed set of accessory kinds. Each kind exposes
//! its services as [`ServiceDescriptor`]s and answers reads and writes
//! through the injected [`DeviceGateway`](crate::tdtool::DeviceGateway).

pub mod host;

pub use host::{
    AccessoryContext, CharacteristicBinding, CharacteristicProps, CharacteristicType,
    CharacteristicValue, Diagnostics, RecordingDiagnostics, ServiceDescriptor, ServiceType,
    TracingDiagnostics,
};

use crate::config::StaticSensor;
use crate::error::{BridgeError, Result};
use crate::tdtool::{
    bits_to_percentage, is_success, percentage_to_bits, DeviceRecord, SensorRecord,
};
use serde::Serialize;
use tracing::debug;

/// Lowest temperature the thermometer service reports
pub const MIN_TEMPERATURE: f64 = -50.0;

/// Combined sensors reporting humidity below this are treated as thermometers
pub const HUMIDITY_OVERRIDE_THRESHOLD: f64 = 1.0;

/// Manufacturer used when the model carries none
pub const UNKNOWN_MANUFACTURER: &str = "N/A";

/// Accessory behaviours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessoryKind {
    Switch,
    Dimmer,
    Hygrometer,
    Thermometer,
    ThermometerHygrometer,
}

/// Model type to accessory kind, in the order reported to users
pub const MODEL_TABLE: &[(&str, AccessoryKind)] = &[
    ("selflearning-switch", AccessoryKind::Switch),
    ("codeswitch", AccessoryKind::Switch),
    ("selflearning-dimmer", AccessoryKind::Dimmer),
    ("humidity", AccessoryKind::Hygrometer),
    ("temperature", AccessoryKind::Thermometer),
    ("temperaturehumidity", AccessoryKind::ThermometerHygrometer),
];

/// Model types with an accessory mapping
pub fn supported_models() -> Vec<String> {
    MODEL_TABLE.iter().map(|(m, _)| m.to_string()).collect()
}

/// Split `model:manufacturer`
pub fn split_model(model: &str) -> (&str, Option<&str>) {
    match model.split_once(':') {
        Some((model_type, manufacturer)) => (model_type, Some(manufacturer)),
        None => (model, None),
    }
}

/// Classify a model string, applying the humidity override
///
/// Some combined sensors misreport themselves as `temperaturehumidity` while
/// stuck near 0% humidity; those are exposed as plain thermometers.
pub fn classify(model: &str, humidity: Option<&str>) -> Option<AccessoryKind> {
    let (model_type, _) = split_model(model);
    let kind = MODEL_TABLE
        .iter()
        .find(|(m, _)| *m == model_type)
        .map(|(_, kind)| *kind)?;

    let humidity = humidity.and_then(|h| h.trim().parse::<f64>().ok());
    match (kind, humidity) {
        (AccessoryKind::ThermometerHygrometer, Some(h)) if h < HUMIDITY_OVERRIDE_THRESHOLD => {
            Some(AccessoryKind::Thermometer)
        }
        _ => Some(kind),
    }
}

impl AccessoryKind {
    /// Services this kind exposes
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let lightbulb = |characteristics| ServiceDescriptor {
            service: ServiceType::Lightbulb,
            characteristics,
        };
        let thermometer = ServiceDescriptor {
            service: ServiceType::TemperatureSensor,
            characteristics: vec![CharacteristicBinding::read_only(
                CharacteristicType::CurrentTemperature,
            )
            .with_min_value(MIN_TEMPERATURE)],
        };
        let hygrometer = ServiceDescriptor {
            service: ServiceType::HumiditySensor,
            characteristics: vec![CharacteristicBinding::read_only(
                CharacteristicType::CurrentRelativeHumidity,
            )],
        };

        match self {
            AccessoryKind::Switch => vec![lightbulb(vec![CharacteristicBinding::read_write(
                CharacteristicType::On,
            )])],
            AccessoryKind::Dimmer => vec![lightbulb(vec![
                CharacteristicBinding::read_write(CharacteristicType::On),
                CharacteristicBinding::read_write(CharacteristicType::Brightness),
            ])],
            AccessoryKind::Hygrometer => vec![hygrometer],
            AccessoryKind::Thermometer => vec![thermometer],
            AccessoryKind::ThermometerHygrometer => vec![thermometer, hygrometer],
        }
    }

    /// Whether `characteristic` is wired on this kind
    pub fn exposes(&self, characteristic: CharacteristicType) -> bool {
        self.binding(characteristic).is_some()
    }

    fn binding(&self, characteristic: CharacteristicType) -> Option<CharacteristicBinding> {
        self.services()
            .into_iter()
            .flat_map(|s| s.characteristics)
            .find(|b| b.characteristic == characteristic)
    }
}

/// Switch state from the last command sent
///
/// Compared against `OFF` rather than `ON` because dimmed devices report
/// `DIMMED` while lit.
pub fn switch_state(last_sent_command: Option<&str>) -> bool {
    last_sent_command != Some("OFF")
}

/// Dimmer brightness in percent
pub fn dimmer_brightness(device: &DeviceRecord) -> u8 {
    match device.dim_level() {
        Some(level) => bits_to_percentage(level),
        None if device.last_sent_command() == Some("ON") => 100,
        None => 0,
    }
}

/// Humidity from a sensor row, if fresh
pub fn humidity_reading(id: i64, sensor: Option<&SensorRecord>) -> Result<f64> {
    sensor
        .filter(|s| s.is_fresh())
        .and_then(SensorRecord::humidity)
        .ok_or(BridgeError::SensorUnavailable(id))
}

/// Temperature in Celsius from a sensor row, if fresh
pub fn temperature_reading(id: i64, sensor: Option<&SensorRecord>) -> Result<f64> {
    sensor
        .filter(|s| s.is_fresh())
        .and_then(SensorRecord::temperature)
        .ok_or(BridgeError::SensorUnavailable(id))
}

/// Classifier input, built from a device, a live sensor or a static sensor
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorySource {
    pub id: i64,
    pub name: String,
    pub model: String,
    pub humidity: Option<String>,
}

impl AccessorySource {
    pub fn from_device(device: &DeviceRecord) -> Self {
        Self {
            id: device.id,
            name: device
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Device {}", device.id)),
            model: device.model().unwrap_or_default().to_string(),
            humidity: device.field("humidity").map(str::to_string),
        }
    }

    /// Live sensor, named `Thermometer <id>`
    pub fn from_sensor(sensor: &SensorRecord) -> Self {
        Self {
            id: sensor.id,
            name: format!("Thermometer {}", sensor.id),
            model: sensor.model().unwrap_or_default().to_string(),
            humidity: sensor.field("humidity").map(str::to_string),
        }
    }

    pub fn from_static(sensor: &StaticSensor) -> Self {
        Self {
            id: sensor.id,
            name: sensor.display_name(),
            model: sensor.model_or_default().to_string(),
            humidity: None,
        }
    }
}

/// A classified accessory bound to the gateway
#[derive(Debug, Clone, Serialize)]
pub struct Accessory {
    pub id: i64,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub kind: AccessoryKind,
    #[serde(skip)]
    ctx: AccessoryContext,
}

impl Accessory {
    pub fn new(source: &AccessorySource, kind: AccessoryKind, ctx: AccessoryContext) -> Self {
        let (model, manufacturer) = split_model(&source.model);
        Self {
            id: source.id,
            name: source.name.clone(),
            model: model.to_string(),
            manufacturer: manufacturer.unwrap_or(UNKNOWN_MANUFACTURER).to_string(),
            kind,
            ctx,
        }
    }

    /// Services for the host to construct
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.kind.services()
    }

    /// Temperature display unit code; always Celsius (0)
    pub fn temperature_units(&self) -> u8 {
        0
    }

    pub fn identify(&self) {
        self.ctx
            .diagnostics
            .log(&format!("[{}]: Identify called.", self.name));
    }

    async fn device(&self) -> Result<DeviceRecord> {
        self.ctx
            .gateway
            .device(self.id)
            .await?
            .ok_or_else(|| BridgeError::not_found(format!("device {}", self.id)))
    }

    /// Read a characteristic
    pub async fn get(&self, characteristic: CharacteristicType) -> Result<CharacteristicValue> {
        if !self.kind.exposes(characteristic) {
            return Err(self.not_exposed(characteristic));
        }

        match characteristic {
            CharacteristicType::On => {
                let device = self.device().await?;
                Ok(CharacteristicValue::Bool(switch_state(
                    device.last_sent_command(),
                )))
            }
            CharacteristicType::Brightness => {
                debug!("[{}]: getDimLevel called", self.name);
                let device = self.device().await?;
                Ok(CharacteristicValue::Number(f64::from(dimmer_brightness(
                    &device,
                ))))
            }
            CharacteristicType::CurrentRelativeHumidity => {
                debug!("[{}]: Checking humidity...", self.name);
                let sensor = self.ctx.gateway.sensor(self.id).await?;
                let humidity = humidity_reading(self.id, sensor.as_ref())?;
                debug!("[{}]: Found humidity {}%", self.name, humidity);
                Ok(CharacteristicValue::Number(humidity))
            }
            CharacteristicType::CurrentTemperature => {
                debug!("[{}]: Checking temperature...", self.name);
                let sensor = self.ctx.gateway.sensor(self.id).await?;
                let temperature = temperature_reading(self.id, sensor.as_ref())?;
                debug!("[{}]: Found temperature {}", self.name, temperature);
                Ok(CharacteristicValue::Number(temperature))
            }
        }
    }

    /// Write a characteristic
    pub async fn set(
        &self,
        characteristic: CharacteristicType,
        value: CharacteristicValue,
    ) -> Result<()> {
        let binding = self
            .kind
            .binding(characteristic)
            .ok_or_else(|| self.not_exposed(characteristic))?;
        if !binding.writable {
            return Err(BridgeError::invalid_input(format!(
                "{} is read-only on {}",
                characteristic, self.name
            )));
        }

        let output = match characteristic {
            CharacteristicType::On => {
                let on = value.as_bool().ok_or_else(|| self.bad_value(characteristic, value))?;
                debug!(
                    "[{}]: Received set state request: [{}]",
                    self.name,
                    if on { "on" } else { "off" }
                );
                if on {
                    self.ctx.gateway.on(self.id).await?
                } else {
                    self.ctx.gateway.off(self.id).await?
                }
            }
            CharacteristicType::Brightness => {
                let percentage = value
                    .as_f64()
                    .ok_or_else(|| self.bad_value(characteristic, value))?;
                self.ctx
                    .gateway
                    .dim(percentage_to_bits(percentage), self.id)
                    .await?
            }
            other => return Err(self.not_exposed(other)),
        };

        if is_success(&output) {
            Ok(())
        } else {
            Err(BridgeError::UnexpectedResponse(output))
        }
    }

    fn not_exposed(&self, characteristic: CharacteristicType) -> BridgeError {
        BridgeError::invalid_input(format!(
            "{} has no {} characteristic",
            self.name, characteristic
        ))
    }

    fn bad_value(&self, characteristic: CharacteristicType, value: CharacteristicValue) -> BridgeError {
        BridgeError::invalid_input(format!(
            "{value:?} is not a valid {characteristic} value for {}",
            self.name
        ))
    }
}

/// Build one accessory per classified source, preserving order
///
/// Unsupported models are reported through the context's diagnostics
/// once each and left out.
pub fn build_accessories(sources: &[AccessorySource], ctx: &AccessoryContext) -> Vec<Accessory> {
    sources
        .iter()
        .filter_map(|source| match classify(&source.model, source.humidity.as_deref()) {
            Some(kind) => Some(Accessory::new(source, kind, ctx.clone())),
            None => {
                let error = BridgeError::UnclassifiedModel {
                    model: split_model(&source.model).0.to_string(),
                    supported: supported_models(),
                };
                ctx.diagnostics.log(&error.to_string());
                debug!(
                    id = source.id,
                    error_code = error.to_error_code().as_number(),
                    "Skipped unclassified source"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGateway;
    use crate::tdtool::parse_records;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    fn device(line: &str) -> DeviceRecord {
        parse_records(line).remove(0).into()
    }

    fn source(id: i64, model: &str, humidity: Option<&str>) -> AccessorySource {
        AccessorySource {
            id,
            name: format!("Thing {id}"),
            model: model.to_string(),
            humidity: humidity.map(str::to_string),
        }
    }

    fn context(gateway: MockGateway) -> (AccessoryContext, Arc<RecordingDiagnostics>) {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        (
            AccessoryContext::new(Arc::new(gateway), diagnostics.clone()),
            diagnostics,
        )
    }

    #[rstest]
    #[case("selflearning-switch:nexa", Some(AccessoryKind::Switch))]
    #[case("codeswitch", Some(AccessoryKind::Switch))]
    #[case("selflearning-dimmer:nexa", Some(AccessoryKind::Dimmer))]
    #[case("humidity", Some(AccessoryKind::Hygrometer))]
    #[case("temperature", Some(AccessoryKind::Thermometer))]
    #[case("temperaturehumidity", Some(AccessoryKind::ThermometerHygrometer))]
    #[case("bell:nexa", None)]
    #[case("", None)]
    fn test_classify_by_model_type(#[case] model: &str, #[case] expected: Option<AccessoryKind>) {
        assert_eq!(classify(model, None), expected);
    }

    #[rstest]
    #[case(Some("0.5"), AccessoryKind::Thermometer)]
    #[case(Some("0"), AccessoryKind::Thermometer)]
    #[case(Some("1.0"), AccessoryKind::ThermometerHygrometer)]
    #[case(Some("45.0"), AccessoryKind::ThermometerHygrometer)]
    #[case(Some("n/a"), AccessoryKind::ThermometerHygrometer)]
    #[case(None, AccessoryKind::ThermometerHygrometer)]
    fn test_humidity_override(#[case] humidity: Option<&str>, #[case] expected: AccessoryKind) {
        assert_eq!(classify("temperaturehumidity:x", humidity), Some(expected));
    }

    #[test]
    fn test_override_only_applies_to_combined_sensors() {
        assert_eq!(classify("humidity", Some("0.2")), Some(AccessoryKind::Hygrometer));
    }

    #[rstest]
    #[case(Some("OFF"), false)]
    #[case(Some("ON"), true)]
    #[case(Some("DIMMED"), true)]
    fn test_switch_state(#[case] last: Option<&str>, #[case] on: bool) {
        assert_eq!(switch_state(last), on);
    }

    #[rstest]
    #[case("id=1\tlastsentcommand=DIMMED\tdimlevel=128", 50)]
    #[case("id=1\tlastsentcommand=ON", 100)]
    #[case("id=1\tlastsentcommand=OFF", 0)]
    #[case("id=1\tlastsentcommand=DIMMED\tdimlevel=0", 0)]
    fn test_dimmer_brightness(#[case] line: &str, #[case] expected: u8) {
        assert_eq!(dimmer_brightness(&device(line)), expected);
    }

    #[test]
    fn test_services_per_kind() {
        let dimmer = AccessoryKind::Dimmer.services();
        assert_eq!(dimmer.len(), 1);
        assert_eq!(dimmer[0].service, ServiceType::Lightbulb);
        assert_eq!(dimmer[0].characteristics.len(), 2);

        let combined = AccessoryKind::ThermometerHygrometer.services();
        assert_eq!(
            combined.iter().map(|s| s.service).collect::<Vec<_>>(),
            vec![ServiceType::TemperatureSensor, ServiceType::HumiditySensor]
        );
        assert_eq!(
            combined[0].characteristics[0].props.min_value,
            Some(MIN_TEMPERATURE)
        );
        assert!(!AccessoryKind::Switch.exposes(CharacteristicType::Brightness));
    }

    #[test]
    fn test_build_preserves_order_and_reports_unknown_models() {
        let (ctx, diagnostics) = context(MockGateway::new());
        let sources = vec![
            source(1, "selflearning-switch:nexa", None),
            source(2, "bell:nexa", None),
            source(3, "temperature", None),
        ];

        let accessories = build_accessories(&sources, &ctx);

        assert_eq!(accessories.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(accessories[0].manufacturer, "nexa");
        assert_eq!(accessories[0].model, "selflearning-switch");
        assert_eq!(accessories[1].manufacturer, UNKNOWN_MANUFACTURER);

        let entries = diagnostics.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("\"bell\""));
        assert!(entries[0].contains("selflearning-switch, codeswitch"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unknown_model_is_logged_once_through_tracing() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let ctx = AccessoryContext::with_tracing(Arc::new(MockGateway::new()));

        let accessories = tracing::subscriber::with_default(subscriber, || {
            build_accessories(&[source(3, "bell:nexa", None)], &ctx)
        });

        assert!(accessories.is_empty());
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output.lines().filter(|l| l.contains("bell")).count(),
            1,
            "{output}"
        );
    }

    #[tokio::test]
    async fn test_switch_get_and_set() {
        let gateway = MockGateway::new()
            .with_devices("type=device\tid=1\tname=Lamp\tmodel=codeswitch\tlastsentcommand=OFF");
        let calls = gateway.calls();
        let (ctx, _) = context(gateway);
        let lamp = build_accessories(&[source(1, "codeswitch", None)], &ctx).remove(0);

        assert_eq!(
            lamp.get(CharacteristicType::On).await.unwrap(),
            CharacteristicValue::Bool(false)
        );
        lamp.set(CharacteristicType::On, CharacteristicValue::Bool(true))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["on 1".to_string()]);
    }

    #[tokio::test]
    async fn test_set_without_success_marker_fails() {
        let gateway = MockGateway::new().with_control_response("Turning off device 1 - Failed\n");
        let (ctx, _) = context(gateway);
        let lamp = build_accessories(&[source(1, "codeswitch", None)], &ctx).remove(0);

        let err = lamp
            .set(CharacteristicType::On, CharacteristicValue::Bool(false))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnexpectedResponse(ref out) if out.contains("Failed")));
    }

    #[tokio::test]
    async fn test_dimmer_brightness_set_scales_to_bits() {
        let gateway = MockGateway::new();
        let calls = gateway.calls();
        let (ctx, _) = context(gateway);
        let dimmer = build_accessories(&[source(4, "selflearning-dimmer:nexa", None)], &ctx).remove(0);

        dimmer
            .set(CharacteristicType::Brightness, CharacteristicValue::Number(50.0))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["dim 128 4".to_string()]);
    }

    #[tokio::test]
    async fn test_sensor_reads_respect_staleness() {
        let gateway = MockGateway::new().with_sensors(
            "type=sensor\tid=11\tmodel=temperaturehumidity\ttemperature=-12.5\thumidity=55\tage=600\n\
             type=sensor\tid=12\tmodel=temperaturehumidity\ttemperature=20.0\thumidity=40\tage=601\n",
        );
        let (ctx, _) = context(gateway);
        let accessories = build_accessories(
            &[
                source(11, "temperaturehumidity", Some("55")),
                source(12, "temperaturehumidity", Some("40")),
                source(13, "temperature", None),
            ],
            &ctx,
        );

        assert_eq!(
            accessories[0].get(CharacteristicType::CurrentTemperature).await.unwrap(),
            CharacteristicValue::Number(-12.5)
        );
        assert_eq!(
            accessories[0].get(CharacteristicType::CurrentRelativeHumidity).await.unwrap(),
            CharacteristicValue::Number(55.0)
        );
        assert!(matches!(
            accessories[1].get(CharacteristicType::CurrentTemperature).await,
            Err(BridgeError::SensorUnavailable(12))
        ));
        assert!(matches!(
            accessories[2].get(CharacteristicType::CurrentTemperature).await,
            Err(BridgeError::SensorUnavailable(13))
        ));
    }

    #[tokio::test]
    async fn test_sensor_characteristics_are_read_only() {
        let (ctx, _) = context(MockGateway::new());
        let thermometer = build_accessories(&[source(5, "temperature", None)], &ctx).remove(0);

        let err = thermometer
            .set(CharacteristicType::CurrentTemperature, CharacteristicValue::Number(3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
        assert!(thermometer.get(CharacteristicType::On).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_device_is_not_found() {
        let (ctx, _) = context(MockGateway::new());
        let lamp = build_accessories(&[source(99, "codeswitch", None)], &ctx).remove(0);
        assert!(matches!(
            lamp.get(CharacteristicType::On).await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_identify_logs() {
        let (ctx, diagnostics) = context(MockGateway::new());
        let lamp = build_accessories(&[source(1, "codeswitch", None)], &ctx).remove(0);
        lamp.identify();
        assert_eq!(diagnostics.entries(), vec!["[Thing 1]: Identify called.".to_string()]);
        assert_eq!(lamp.temperature_units(), 0);
    }
}
