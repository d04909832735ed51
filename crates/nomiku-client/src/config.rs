//! Client configuration.
//!
//! Defaults point at the public Nomiku / Tender service. Every value can be
//! overridden through [`ClientConfig`]'s builder methods, through serde
//! (e.g. a `[nomiku]` table in an application's TOML/JSON config) or through
//! the environment variables listed in [`env_vars`].
//!
//! ```toml
//! api_url = "https://www.eattender.com/api/"
//! http_timeout_secs = 30
//!
//! [mqtt]
//! broker = "wss://mq.nomiku.com:443/mqtt"
//! port = 443
//! transport = "websocket"
//! timeout_secs = 10
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default service endpoints.
pub mod endpoints {
    pub const API_URL: &str = "https://www.eattender.com/api/";
    pub const MQTT_BROKER: &str = "wss://mq.nomiku.com:443/mqtt";
    pub const MQTT_PORT: u16 = 443;
}

/// Environment variable names.
pub mod env_vars {
    pub const API_URL: &str = "NOMIKU_API_URL";
    pub const HTTP_TIMEOUT_SECS: &str = "NOMIKU_HTTP_TIMEOUT_SECS";
    pub const MQTT_BROKER: &str = "NOMIKU_MQTT_BROKER";
    pub const MQTT_PORT: &str = "NOMIKU_MQTT_PORT";
    pub const MQTT_TRANSPORT: &str = "NOMIKU_MQTT_TRANSPORT";
    pub const MQTT_TIMEOUT_SECS: &str = "NOMIKU_MQTT_TIMEOUT_SECS";
    /// Pre-issued API token, skips `authenticate` when set.
    pub const TOKEN: &str = "NOMIKU_TOKEN";
    pub const DEBUG: &str = "NOMIKU_DEBUG";
    /// Emit JSON log lines from [`crate::logging::init_tracing`].
    pub const LOG_JSON: &str = "NOMIKU_LOG_JSON";
}

fn default_api_url() -> String {
    endpoints::API_URL.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_broker() -> String {
    endpoints::MQTT_BROKER.to_string()
}

fn default_port() -> u16 {
    endpoints::MQTT_PORT
}

fn default_keep_alive() -> u64 {
    30
}

fn default_mqtt_timeout() -> u64 {
    10
}

/// How the MQTT connection reaches the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MqttTransportKind {
    /// Plain TCP, `broker` is a host name.
    Tcp,
    /// MQTT over TLS, `broker` is a host name.
    Tls,
    /// MQTT over secure WebSockets, `broker` is a full `wss://host:port/path` URL.
    #[default]
    Websocket,
}

impl FromStr for MqttTransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => Ok(Self::Tcp),
            "tls" | "ssl" | "mqtts" => Ok(Self::Tls),
            "websocket" | "wss" => Ok(Self::Websocket),
            other => Err(format!("unsupported MQTT transport: {}", other)),
        }
    }
}

/// MQTT broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host (TCP/TLS) or URL (WebSocket)
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport used to reach the broker
    #[serde(default)]
    pub transport: MqttTransportKind,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Upper bound for one get/set round trip, in seconds
    #[serde(default = "default_mqtt_timeout")]
    pub timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_port(),
            transport: MqttTransportKind::default(),
            keep_alive_secs: default_keep_alive(),
            timeout_secs: default_mqtt_timeout(),
        }
    }
}

impl MqttConfig {
    pub fn new(broker: impl Into<String>, port: u16, transport: MqttTransportKind) -> Self {
        Self {
            broker: broker.into(),
            port,
            transport,
            ..Self::default()
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST API (a trailing `/` is added when missing)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            http_timeout_secs: default_http_timeout(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the REST API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    /// Replace the MQTT settings.
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// API base URL, always ending in `/` so endpoint paths can be appended.
    pub fn normalized_api_url(&self) -> String {
        let url = self.api_url.trim();
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{}/", url)
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Defaults overridden by whichever [`env_vars`] are set.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(env_vars::API_URL) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }
        if let Some(secs) = env_parse(env_vars::HTTP_TIMEOUT_SECS) {
            config.http_timeout_secs = secs;
        }
        if let Ok(broker) = std::env::var(env_vars::MQTT_BROKER) {
            if !broker.trim().is_empty() {
                config.mqtt.broker = broker;
            }
        }
        if let Some(port) = env_parse(env_vars::MQTT_PORT) {
            config.mqtt.port = port;
        }
        if let Some(transport) = env_parse(env_vars::MQTT_TRANSPORT) {
            config.mqtt.transport = transport;
        }
        if let Some(secs) = env_parse(env_vars::MQTT_TIMEOUT_SECS) {
            config.mqtt.timeout_secs = secs;
        }

        config
    }
}

/// Read and parse an environment variable, `None` when unset or invalid.
pub(crate) fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
