//! Nomiku / Tender Client
//!
//! Client adapter for the Nomiku / Tender sous-vide cloud service. It logs a
//! user in, lists their devices, reads telemetry and changes device state
//! over two paths:
//!
//! - **REST** (`reqwest`): authentication, user lookup, device list, device
//!   session and telemetry, device state updates.
//! - **MQTT** (`rumqttc`): live get/set of device variables (`state`, `temp`,
//!   `setpoint`, `recipeID`, `version`), one short-lived broker connection
//!   per call.
//!
//! ## Architecture
//!
//! - **Session**: token, user id, selected device, debug flag
//! - **RestApi**: HTTP operations, credentials taken from the session
//! - **MqttBridge**: per-call broker round trips behind the `MqttTransport` trait
//! - **NomikuClient**: the facade combining all of the above
//!
//! ```no_run
//! use nomiku_client::{ClientConfig, DeviceState, NomikuClient};
//!
//! # async fn run() -> nomiku_client::NomikuResult<()> {
//! let mut client = NomikuClient::new(ClientConfig::default())?;
//! client.authenticate("chef@example.com", "hunter2").await?;
//!
//! let devices = client.get_devices().await?;
//! if let Some(hw) = devices.iter().find_map(|d| d.hardware_id()) {
//!     client.set_device_id(hw);
//!     let state: DeviceState = client
//!         .get_state()
//!         .await?
//!         .parse()
//!         .unwrap_or(DeviceState::Offline);
//!     println!("state = {}", state);
//!     client.set_set_point(63.5).await?;
//! }
//! # Ok(())
//! # }
//! ```

/// Session-gated diagnostic message, emitted only while debugging is enabled.
///
/// Logged at `info` so the default `nomiku=info` filter shows it.
macro_rules! diag {
    ($session:expr, $($arg:tt)*) => {
        if $session.is_debug() {
            tracing::info!(target: "nomiku", "[nomiku] {}", format_args!($($arg)*));
        }
    };
}

pub mod client;
pub mod config;
pub mod conversion;
pub mod device;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod rest;
pub mod session;

pub use client::NomikuClient;
pub use config::{ClientConfig, MqttConfig, MqttTransportKind};
pub use conversion::{celsius_to_fahrenheit, fahrenheit_to_celsius};
pub use device::{variables, Device, DeviceSession, DeviceState};
pub use error::{NomikuError, NomikuResult};
pub use mqtt::{
    MqttBridge, MqttCredentials, MqttExchange, MqttTransport, OutgoingMessage, RumqttcTransport,
    VariableValue,
};
pub use rest::{Credentials, RestApi, UserKind, UserRef};
pub use session::Session;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
