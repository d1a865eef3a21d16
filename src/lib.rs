//! Bridge between the Telldus `tdtool` CLI and a smart-home accessory host
//!
//! The [`tdtool`] gateway shells out to tdtool to list devices and sensors
//! and to switch or dim devices. The [`accessory`] classifier turns each
//! listed record into a typed accessory whose characteristics read and
//! write through that gateway. [`platform`] ties the two together for one
//! discovery cycle.
//!
//! # Example
//!
//! ```no_run
//! use tdtool_bridge::{BridgeConfig, TdToolPlatform};
//!
//! # async fn run() -> tdtool_bridge::Result<()> {
//! let config = BridgeConfig::load(None)?;
//! let platform = TdToolPlatform::from_config(&config);
//! for accessory in platform.accessories().await? {
//!     println!("{} ({:?})", accessory.name, accessory.kind);
//! }
//! # Ok(())
//! # }
//! ```

pub mod accessory;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod tdtool;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use accessory::{classify, Accessory, AccessoryContext, AccessoryKind, CharacteristicType};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use platform::TdToolPlatform;
pub use tdtool::{DeviceGateway, TdTool};
