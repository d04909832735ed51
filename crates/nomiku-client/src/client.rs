//! The client facade.
//!
//! [`NomikuClient`] owns one [`Session`] and routes each call to the REST API
//! or to the MQTT bridge. Session mutation takes `&mut self`; everything else
//! takes `&self` and can run concurrently. Use one client per user/device
//! pair when targeting several devices at the same time.

use std::sync::Arc;

use serde_json::Value;

use crate::config::{env_vars, ClientConfig};
use crate::conversion;
use crate::device::{variables, Device, DeviceSession, DeviceState};
use crate::error::NomikuResult;
use crate::mqtt::{MqttBridge, MqttTransport, VariableValue};
use crate::rest::{Credentials, RestApi, UserKind, UserRef};
use crate::session::Session;

/// Nomiku / Tender service client.
#[derive(Clone)]
pub struct NomikuClient {
    session: Session,
    rest: RestApi,
    mqtt: MqttBridge,
}

impl NomikuClient {
    /// Client with the given configuration and the `rumqttc` transport.
    pub fn new(config: ClientConfig) -> NomikuResult<Self> {
        let mqtt = MqttBridge::new(&config.mqtt);
        Self::build(&config, mqtt)
    }

    /// Client whose MQTT round trips go through `transport`.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn MqttTransport>,
    ) -> NomikuResult<Self> {
        let mqtt = MqttBridge::with_transport(transport, config.mqtt.timeout());
        Self::build(&config, mqtt)
    }

    /// Client configured from the environment (see [`env_vars`]).
    ///
    /// `NOMIKU_TOKEN` seeds the API token and `NOMIKU_DEBUG` the debug flag.
    pub fn from_env() -> NomikuResult<Self> {
        let mut client = Self::new(ClientConfig::from_env())?;
        if let Ok(token) = std::env::var(env_vars::TOKEN) {
            client.set_token(token);
        }
        if let Some(debug) = crate::config::env_parse::<bool>(env_vars::DEBUG) {
            client.set_debug(debug);
        }
        Ok(client)
    }

    fn build(config: &ClientConfig, mqtt: MqttBridge) -> NomikuResult<Self> {
        Ok(Self {
            session: Session::default(),
            rest: RestApi::new(config)?,
            mqtt,
        })
    }

    // Session

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.session.set_debug(enabled);
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> bool {
        self.session.set_token(token)
    }

    pub fn set_user_id(&mut self, id: u64) -> bool {
        self.session.set_user_id(id)
    }

    pub fn set_device_id(&mut self, id: impl Into<String>) -> bool {
        self.session.set_device_id(id)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token()
    }

    pub fn user_id(&self) -> Option<u64> {
        self.session.user_id()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.session.device_id()
    }

    /// Drop the token and user id.
    pub fn logout(&mut self) {
        self.session.clear();
    }

    // REST

    pub async fn authenticate(&mut self, email: &str, password: &str) -> NomikuResult<Credentials> {
        self.rest
            .authenticate(&mut self.session, email, password)
            .await
    }

    pub async fn get_user(&self, user: impl Into<UserRef>, kind: UserKind) -> NomikuResult<Value> {
        self.rest.get_user(&self.session, &user.into(), kind).await
    }

    pub async fn get_devices(&self) -> NomikuResult<Vec<Device>> {
        self.rest.get_devices(&self.session).await
    }

    pub async fn get_device_session(&self, device_id: &str) -> NomikuResult<DeviceSession> {
        self.rest.get_device_session(&self.session, device_id).await
    }

    pub async fn get_device_state(&self, device_id: &str) -> NomikuResult<Value> {
        self.rest.get_device_state(&self.session, device_id).await
    }

    pub async fn set_device_state(
        &self,
        device_id: &str,
        desired_state: Value,
    ) -> NomikuResult<Value> {
        self.rest
            .set_device_state(&self.session, device_id, desired_state)
            .await
    }

    // MQTT

    pub async fn get_variable(&self, variable: &str) -> NomikuResult<String> {
        self.mqtt.get_variable(&self.session, variable).await
    }

    pub async fn set_variable(
        &self,
        variable: &str,
        value: impl Into<VariableValue>,
    ) -> NomikuResult<String> {
        self.mqtt.set_variable(&self.session, variable, value).await
    }

    pub async fn get_mqtt_variable(
        &self,
        hardware_id: &str,
        variable: &str,
    ) -> NomikuResult<String> {
        self.mqtt
            .get_mqtt_variable(&self.session, hardware_id, variable)
            .await
    }

    pub async fn set_mqtt_variable(
        &self,
        hardware_id: &str,
        variable: &str,
        value: impl Into<VariableValue>,
    ) -> NomikuResult<String> {
        self.mqtt
            .set_mqtt_variable(&self.session, hardware_id, variable, value)
            .await
    }

    /// Raw `state` payload, parse with [`DeviceState::from_str`](std::str::FromStr).
    pub async fn get_state(&self) -> NomikuResult<String> {
        self.get_variable(variables::STATE).await
    }

    pub async fn get_temp(&self) -> NomikuResult<String> {
        self.get_variable(variables::TEMP).await
    }

    pub async fn get_set_point(&self) -> NomikuResult<String> {
        self.get_variable(variables::SET_POINT).await
    }

    pub async fn get_recipe_id(&self) -> NomikuResult<String> {
        self.get_variable(variables::RECIPE_ID).await
    }

    pub async fn get_version(&self) -> NomikuResult<String> {
        self.get_variable(variables::VERSION).await
    }

    pub async fn set_state(&self, state: DeviceState) -> NomikuResult<String> {
        self.set_variable(variables::STATE, state).await
    }

    pub async fn set_set_point(&self, set_point: impl Into<VariableValue>) -> NomikuResult<String> {
        self.set_variable(variables::SET_POINT, set_point).await
    }

    // Conversion

    pub fn celsius_to_fahrenheit(&self, c: f64) -> f64 {
        conversion::celsius_to_fahrenheit(c)
    }

    pub fn fahrenheit_to_celsius(&self, f: f64) -> f64 {
        conversion::fahrenheit_to_celsius(f)
    }
}
