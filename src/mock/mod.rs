//! Mock implementations for testing
//!
//! [`MockGateway`] stands in for tdtool at the accessory seam;
//! [`ScriptedRunner`] stands in for the subprocess seam beneath [`TdTool`](crate::tdtool::TdTool).

use crate::error::{BridgeError, Result};
use crate::tdtool::{
    parse_records, CommandOutput, CommandRunner, DeviceGateway, DeviceRecord, SensorRecord,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared log of calls made against a mock
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(calls: &CallLog, call: String) {
    if let Ok(mut calls) = calls.lock() {
        calls.push(call);
    }
}

/// In-memory gateway answering from fixed tdtool listings
pub struct MockGateway {
    devices: Vec<DeviceRecord>,
    sensors: Vec<SensorRecord>,
    control_response: String,
    calls: CallLog,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            sensors: Vec::new(),
            control_response: "Success\n".to_string(),
            calls: Arc::default(),
        }
    }

    /// Devices, given as `tdtool --list-devices` output
    pub fn with_devices(mut self, listing: &str) -> Self {
        self.devices = parse_records(listing).into_iter().map(Into::into).collect();
        self
    }

    /// Sensors, given as `tdtool --list-sensors` output
    pub fn with_sensors(mut self, listing: &str) -> Self {
        self.sensors = parse_records(listing).into_iter().map(Into::into).collect();
        self
    }

    /// Output returned by on/off/dim
    pub fn with_control_response(mut self, output: &str) -> Self {
        self.control_response = output.to_string();
        self
    }

    /// Handle on the control calls received, as `on <id>`, `off <id>` or `dim <level> <id>`
    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceGateway for MockGateway {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.devices.clone())
    }

    async fn list_sensors(&self) -> Result<Vec<SensorRecord>> {
        Ok(self.sensors.clone())
    }

    async fn on(&self, id: i64) -> Result<String> {
        record(&self.calls, format!("on {id}"));
        Ok(self.control_response.clone())
    }

    async fn off(&self, id: i64) -> Result<String> {
        record(&self.calls, format!("off {id}"));
        Ok(self.control_response.clone())
    }

    async fn dim(&self, level: u8, id: i64) -> Result<String> {
        record(&self.calls, format!("dim {level} {id}"));
        Ok(self.control_response.clone())
    }
}

/// Runner replaying canned outputs in order
///
/// Each invocation is logged as `program arg arg...`. Running out of
/// script yields an I/O `NotFound`, like a missing binary.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<CommandOutput>>>,
    calls: CallLog,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next invocation's result
    pub fn then(self, output: CommandOutput) -> Self {
        self.then_result(Ok(output))
    }

    pub fn then_result(self, result: Result<CommandOutput>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
        self
    }

    /// Queue a successful `command -v` lookup
    pub fn installed(self) -> Self {
        self.then(CommandOutput::ok("/usr/bin/tdtool\n"))
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut call = program.to_string();
        for arg in args {
            call.push(' ');
            call.push_str(arg);
        }
        record(&self.calls, call);

        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| {
                Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted output for {program}"),
                )))
            })
    }
}
