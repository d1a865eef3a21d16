//! Fake tdtool and fixtures shared by the integration tests
//!
//! [`FakeTdtool`] answers subprocess invocations by their argument line,
//! so tests exercise the real gateway without a Tellstick attached.

#![allow(dead_code)]

use async_trait::async_trait;
use rstest::fixture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tdtool_bridge::config::ToolConfig;
use tdtool_bridge::error::Result;
use tdtool_bridge::tdtool::{CommandOutput, CommandRunner};

pub const NEXA_SWITCH: &str =
    "type=device\tid=1\tname=Lamp\tprotocol=arctech\tmodel=selflearning-switch:nexa\tlastsentcommand=OFF\n";

pub const MIXED_DEVICES: &str = "\
type=device\tid=1\tname=Lamp\tmodel=selflearning-switch:nexa\tlastsentcommand=ON\n\
type=device\tid=2\tname=Hall dimmer\tmodel=selflearning-dimmer:nexa\tlastsentcommand=DIMMED\tdimlevel=64\n\
type=device\tid=3\tname=Door bell\tmodel=bell\n\
type=group\tid=4\tname=Everything\tmodel=group\n";

pub const SENSORS: &str = "\
type=sensor\tid=135\tmodel=temperaturehumidity\tprotocol=fineoffset\ttemperature=21.5\thumidity=40\tage=12\n\
type=sensor\tid=136\tmodel=temperaturehumidity\tprotocol=fineoffset\ttemperature=-3.0\thumidity=0\tage=30\n\
type=sensor\tid=137\tmodel=humidity\tprotocol=mandolyn\thumidity=77\tage=900\n";

/// Scripted stand-in for the tdtool binary
#[derive(Clone, Default)]
pub struct FakeTdtool {
    installed: bool,
    routes: Arc<Mutex<HashMap<String, CommandOutput>>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTdtool {
    /// tdtool present, with empty listings
    pub fn installed() -> Self {
        let fake = Self {
            installed: true,
            ..Self::default()
        };
        fake.route("--list-devices", CommandOutput::ok(""))
            .route("--list-sensors", CommandOutput::ok(""))
    }

    /// `command -v tdtool` finds nothing
    pub fn missing() -> Self {
        Self::default()
    }

    /// Answer `tdtool <args>` with `output`
    pub fn route(self, args: &str, output: CommandOutput) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(args.to_string(), output);
        self
    }

    pub fn devices(self, listing: &str) -> Self {
        self.route("--list-devices", CommandOutput::ok(listing))
    }

    pub fn sensors(self, listing: &str) -> Self {
        self.route("--list-sensors", CommandOutput::ok(listing))
    }

    /// Delay every tdtool invocation
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Invocations so far, as `program arg arg...`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, args: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.ends_with(args))
            .count()
    }
}

#[async_trait]
impl CommandRunner for FakeTdtool {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let line = args.join(" ");
        self.calls
            .lock()
            .unwrap()
            .push(format!("{program} {line}"));

        if program == "sh" {
            return Ok(if self.installed {
                CommandOutput::ok("/usr/bin/tdtool\n")
            } else {
                CommandOutput::failed("")
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let output = self.routes.lock().unwrap().get(&line).cloned();
        Ok(output.unwrap_or_else(|| CommandOutput::failed(format!("Unknown command: {line}"))))
    }
}

/// Tool settings pointing at a tellstick.conf that does not exist
#[fixture]
pub fn tool_config() -> ToolConfig {
    ToolConfig {
        conf_path: PathBuf::from("/nonexistent/tellstick.conf"),
        ..ToolConfig::default()
    }
}
