//! MQTT bridge for live device variables.
//!
//! Every get/set opens its own broker connection, authenticated as
//! `user/<user_id>` with the API token as password, and closes it as soon as
//! the first message arrives on the watched topic or the connection fails.
//!
//! ## Topic Format
//!
//! Read: `nom2/{hardware_id}/get/{variable}` (subscribe)
//! Write: `nom2/{hardware_id}/set/{variable}` (publish)
//!
//! A set publishes the value and then subscribes to the matching get topic.
//! The echo is not guaranteed to reflect the value just written; it is often
//! the previous one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{MqttConfig, MqttTransportKind};
use crate::device::DeviceState;
use crate::error::{NomikuError, NomikuResult};
use crate::session::Session;

/// Topic namespace of the device protocol.
pub const TOPIC_PREFIX: &str = "nom2";

/// How long a finished round trip waits for its DISCONNECT to go out.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Topic a device publishes the current value of `variable` on.
pub fn get_topic(hardware_id: &str, variable: &str) -> String {
    format!("{}/{}/get/{}", TOPIC_PREFIX, hardware_id, variable)
}

/// Topic a device accepts new values of `variable` on.
pub fn set_topic(hardware_id: &str, variable: &str) -> String {
    format!("{}/{}/set/{}", TOPIC_PREFIX, hardware_id, variable)
}

/// A value written to a device variable.
///
/// The wire protocol only carries strings: numbers are written in decimal,
/// booleans as `true`/`false`.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl VariableValue {
    /// String payload, or `None` when the value counts as missing
    /// (empty text, NaN or infinite floats).
    pub fn to_payload(&self) -> Option<String> {
        match self {
            Self::Text(s) if s.is_empty() => None,
            Self::Text(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) if !f.is_finite() => None,
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_payload() {
            Some(payload) => f.write_str(&payload),
            None => f.write_str("<missing>"),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for VariableValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u32> for VariableValue {
    fn from(v: u32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for VariableValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DeviceState> for VariableValue {
    fn from(state: DeviceState) -> Self {
        Self::Integer(state.code() as i64)
    }
}

/// Broker login derived from the session.
#[derive(Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub username: String,
    pub password: String,
}

impl MqttCredentials {
    /// `None` unless the session holds both a token and a user id.
    pub fn from_session(session: &Session) -> Option<Self> {
        match (session.user_id(), session.token()) {
            (Some(user_id), Some(token)) => Some(Self {
                username: format!("user/{}", user_id),
                password: token.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for MqttCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Message published right after the connection is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    pub payload: String,
}

/// What one connection does: optionally publish, then wait on one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttExchange {
    pub publish: Option<OutgoingMessage>,
    pub subscribe: String,
}

impl MqttExchange {
    pub fn get(hardware_id: &str, variable: &str) -> Self {
        Self {
            publish: None,
            subscribe: get_topic(hardware_id, variable),
        }
    }

    pub fn set(hardware_id: &str, variable: &str, payload: String) -> Self {
        Self {
            publish: Some(OutgoingMessage {
                topic: set_topic(hardware_id, variable),
                payload,
            }),
            subscribe: get_topic(hardware_id, variable),
        }
    }
}

/// One connect / exchange / disconnect cycle against the broker.
///
/// Implementations open a fresh connection per call and must tear it down
/// before returning. The payload of the first message on
/// `exchange.subscribe` is the result.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    async fn round_trip(
        &self,
        credentials: &MqttCredentials,
        exchange: &MqttExchange,
    ) -> NomikuResult<String>;
}

/// [`MqttTransport`] backed by `rumqttc`.
#[derive(Debug, Clone)]
pub struct RumqttcTransport {
    config: MqttConfig,
}

impl RumqttcTransport {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    fn options(&self, credentials: &MqttCredentials) -> MqttOptions {
        let client_id = format!("nomiku-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, self.config.broker.clone(), self.config.port);
        options.set_credentials(credentials.username.clone(), credentials.password.clone());
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        options.set_transport(match self.config.transport {
            MqttTransportKind::Tcp => Transport::tcp(),
            MqttTransportKind::Tls => Transport::tls_with_default_config(),
            MqttTransportKind::Websocket => Transport::wss_with_default_config(),
        });
        options
    }
}

#[async_trait]
impl MqttTransport for RumqttcTransport {
    async fn round_trip(
        &self,
        credentials: &MqttCredentials,
        exchange: &MqttExchange,
    ) -> NomikuResult<String> {
        let (client, mut eventloop) = AsyncClient::new(self.options(credentials), 10);

        let outcome = loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    debug!("MQTT connected to {}", self.config.broker);
                    if let Some(message) = &exchange.publish {
                        if let Err(e) = client
                            .publish(
                                message.topic.clone(),
                                QoS::AtMostOnce,
                                false,
                                message.payload.clone().into_bytes(),
                            )
                            .await
                        {
                            break Err(NomikuError::Mqtt(e.to_string()));
                        }
                    }
                    if let Err(e) = client
                        .subscribe(exchange.subscribe.clone(), QoS::AtMostOnce)
                        .await
                    {
                        break Err(NomikuError::Mqtt(e.to_string()));
                    }
                }
                Ok(Event::Incoming(Packet::Publish(message)))
                    if message.topic == exchange.subscribe =>
                {
                    break Ok(String::from_utf8_lossy(&message.payload).into_owned());
                }
                Ok(_) => {}
                Err(e) => {
                    // The event loop is dropped without polling again, so no reconnect happens.
                    warn!("MQTT connection error: {}", e);
                    return Err(NomikuError::Mqtt(e.to_string()));
                }
            }
        };

        close(client, eventloop).await;
        outcome
    }
}

async fn close(client: AsyncClient, mut eventloop: EventLoop) {
    if client.try_disconnect().is_err() {
        return;
    }
    let _ = tokio::time::timeout(CLOSE_GRACE, async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
}

/// Validates requests against the session and runs them through a transport
/// with a bounded round trip time.
#[derive(Clone)]
pub struct MqttBridge {
    transport: Arc<dyn MqttTransport>,
    timeout: Duration,
}

impl MqttBridge {
    /// Bridge over `rumqttc` using the given broker settings.
    pub fn new(config: &MqttConfig) -> Self {
        Self::with_transport(Arc::new(RumqttcTransport::new(config.clone())), config.timeout())
    }

    pub fn with_transport(transport: Arc<dyn MqttTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read `variable` from the session's selected device.
    pub async fn get_variable(&self, session: &Session, variable: &str) -> NomikuResult<String> {
        check_variable(variable)?;
        let credentials = require_credentials(session)?;
        let device_id = require_device(session.device_id(), "deviceID")?;

        diag!(session, "Getting {} from {}", variable, device_id);
        self.run(&credentials, MqttExchange::get(device_id, variable))
            .await
    }

    /// Write `variable` on the session's selected device.
    pub async fn set_variable(
        &self,
        session: &Session,
        variable: &str,
        value: impl Into<VariableValue>,
    ) -> NomikuResult<String> {
        let device_id = session.device_id();
        self.set_on(session, device_id, "deviceID", variable, value.into())
            .await
    }

    /// Read `variable` from an explicit hardware id.
    pub async fn get_mqtt_variable(
        &self,
        session: &Session,
        hardware_id: &str,
        variable: &str,
    ) -> NomikuResult<String> {
        check_variable(variable)?;
        let credentials = require_credentials(session)?;
        let hardware_id = require_device(Some(hardware_id), "hardwareID")?;

        diag!(session, "Getting {} from {}", variable, hardware_id);
        self.run(&credentials, MqttExchange::get(hardware_id, variable))
            .await
    }

    /// Write `variable` on an explicit hardware id, ignoring the selected device.
    pub async fn set_mqtt_variable(
        &self,
        session: &Session,
        hardware_id: &str,
        variable: &str,
        value: impl Into<VariableValue>,
    ) -> NomikuResult<String> {
        self.set_on(session, Some(hardware_id), "hardwareID", variable, value.into())
            .await
    }

    async fn set_on(
        &self,
        session: &Session,
        target: Option<&str>,
        target_name: &str,
        variable: &str,
        value: VariableValue,
    ) -> NomikuResult<String> {
        check_variable(variable)?;
        let payload = value.to_payload().ok_or_else(|| NomikuError::missing("value"))?;
        let credentials = require_credentials(session)?;
        let target = require_device(target, target_name)?;

        diag!(session, "Setting {} to {} on {}", variable, payload, target);
        self.run(&credentials, MqttExchange::set(target, variable, payload))
            .await
    }

    async fn run(
        &self,
        credentials: &MqttCredentials,
        exchange: MqttExchange,
    ) -> NomikuResult<String> {
        match tokio::time::timeout(self.timeout, self.transport.round_trip(credentials, &exchange))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "MQTT round trip on {} timed out after {:?}",
                    exchange.subscribe, self.timeout
                );
                Err(NomikuError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}

fn check_variable(variable: &str) -> NomikuResult<()> {
    if variable.is_empty() {
        return Err(NomikuError::missing("variableName"));
    }
    Ok(())
}

fn require_credentials(session: &Session) -> NomikuResult<MqttCredentials> {
    MqttCredentials::from_session(session).ok_or_else(NomikuError::not_authenticated)
}

fn require_device<'a>(id: Option<&'a str>, name: &str) -> NomikuResult<&'a str> {
    match id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(NomikuError::missing(name)),
    }
}
