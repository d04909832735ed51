//! Shared fixtures: an in-process mock of the REST API and a recording MQTT
//! transport.

#![allow(dead_code)]

pub mod broker;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use nomiku_client::{
    ClientConfig, MqttConfig, MqttCredentials, MqttExchange, MqttTransport, MqttTransportKind,
    NomikuError, NomikuResult,
};
use serde_json::{json, Value};

pub const EMAIL: &str = "chef@example.com";
pub const PASSWORD: &str = "sous-vide";
/// Gets a 201 whose body lacks `user_id`.
pub const MALFORMED_EMAIL: &str = "malformed@example.com";
pub const USER_ID: u64 = 42;
pub const TOKEN: &str = "abc";
pub const DEVICE_ID: &str = "7";
/// Device whose session lookup fails with 503.
pub const BROKEN_DEVICE_ID: &str = "9";
pub const HARDWARE_ID: &str = "ab12cd";
pub const SESSION_TOKEN: &str = "live-token";

/// Per-endpoint request counters.
#[derive(Default)]
pub struct Counters {
    pub auth: AtomicUsize,
    pub user: AtomicUsize,
    pub devices: AtomicUsize,
    pub session: AtomicUsize,
    pub telemetry: AtomicUsize,
    pub set: AtomicUsize,
}

impl Counters {
    pub fn total(&self) -> usize {
        [
            &self.auth,
            &self.user,
            &self.devices,
            &self.session,
            &self.telemetry,
            &self.set,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

#[derive(Clone)]
struct AppState {
    base_url: String,
    counters: Arc<Counters>,
    last_set: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

/// Running mock API.
pub struct MockApi {
    pub addr: SocketAddr,
    pub counters: Arc<Counters>,
    last_set: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

impl MockApi {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock API");
        let addr = listener.local_addr().expect("Failed to read mock API address");

        let counters = Arc::new(Counters::default());
        let last_set = Arc::new(Mutex::new(None));
        let state = AppState {
            base_url: format!("http://{}", addr),
            counters: counters.clone(),
            last_set: last_set.clone(),
        };

        let app = Router::new()
            .route("/api/users/auth", post(auth))
            .route("/api/users/:id", get(user))
            .route("/api/devices", get(devices))
            .route("/api/devices/:id/session", get(device_session))
            .route("/api/devices/:id/set", post(set_device))
            .route("/live/:id", get(telemetry))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock API stopped");
        });

        Self {
            addr,
            counters,
            last_set,
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    /// Client configuration pointing at this mock and a local TCP broker.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_api_url(self.api_url())
            .with_http_timeout_secs(5)
            .with_mqtt(
                MqttConfig::new("127.0.0.1", 1883, MqttTransportKind::Tcp).with_timeout_secs(2),
            )
    }

    /// Headers and JSON body of the last `POST devices/{id}/set`.
    pub fn last_set(&self) -> Option<(HeaderMap, Value)> {
        self.last_set.lock().expect("poisoned").clone()
    }
}

fn has_token(headers: &HeaderMap) -> bool {
    headers
        .get("x-api-token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOKEN)
        .unwrap_or(false)
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })))
}

async fn auth(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.counters.auth.fetch_add(1, Ordering::SeqCst);

    let email = form.get("email").map(String::as_str);
    let password = form.get("password").map(String::as_str);
    match (email, password) {
        (Some(EMAIL), Some(PASSWORD)) => (
            StatusCode::CREATED,
            Json(json!({ "user_id": USER_ID, "api_token": TOKEN })),
        ),
        (Some(MALFORMED_EMAIL), _) => (StatusCode::CREATED, Json(json!({ "api_token": TOKEN }))),
        _ => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "invalid credentials" })),
        ),
    }
}

async fn user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.counters.user.fetch_add(1, Ordering::SeqCst);

    if id != USER_ID.to_string() {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "no such user" })));
    }

    let mut user = json!({ "id": USER_ID, "name": "Chef" });
    if has_token(&headers) {
        user["email"] = json!(EMAIL);
    }
    (StatusCode::OK, Json(json!({ "user": user })))
}

async fn devices(State(state): State<AppState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    state.counters.devices.fetch_add(1, Ordering::SeqCst);

    if !has_token(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "devices": [
                { "id": 7, "name": "Kitchen", "hardware_device_id": HARDWARE_ID },
                { "id": 9, "name": "Virtual", "hardware_device_id": "" }
            ]
        })),
    )
}

async fn device_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.counters.session.fetch_add(1, Ordering::SeqCst);

    if !has_token(&headers) {
        return unauthorized();
    }
    if id != DEVICE_ID {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "device offline" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "session_token": SESSION_TOKEN,
            "session_base_url": state.base_url,
            "session_path": format!("/live/{}", id)
        })),
    )
}

async fn telemetry(
    State(state): State<AppState>,
    Path(_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.counters.telemetry.fetch_add(1, Ordering::SeqCst);

    if query.get("auth").map(String::as_str) != Some(SESSION_TOKEN) {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "bad session" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "recipeID": 3,
            "setpoint": 63.5,
            "showF": false,
            "state": 1,
            "temp": 61.2,
            "timerRunning": false,
            "timerSecs": 0
        })),
    )
}

async fn set_device(
    State(state): State<AppState>,
    Path(_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.counters.set.fetch_add(1, Ordering::SeqCst);
    *state.last_set.lock().expect("poisoned") = Some((headers.clone(), body.clone()));

    if !has_token(&headers) {
        return unauthorized();
    }
    (StatusCode::CREATED, Json(json!({ "state": body["state"] })))
}

/// What a [`RecordingTransport`] answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Payload(String),
    Error(String),
    /// Never answers.
    Hang,
}

/// MQTT transport that records every round trip instead of talking to a broker.
pub struct RecordingTransport {
    reply: Reply,
    calls: Mutex<Vec<(MqttCredentials, MqttExchange)>>,
}

impl RecordingTransport {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(MqttCredentials, MqttExchange)> {
        self.calls.lock().expect("poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("poisoned").len()
    }
}

#[async_trait]
impl MqttTransport for RecordingTransport {
    async fn round_trip(
        &self,
        credentials: &MqttCredentials,
        exchange: &MqttExchange,
    ) -> NomikuResult<String> {
        self.calls
            .lock()
            .expect("poisoned")
            .push((credentials.clone(), exchange.clone()));

        match &self.reply {
            Reply::Payload(payload) => Ok(payload.clone()),
            Reply::Error(error) => Err(NomikuError::Mqtt(error.clone())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// A short timeout for tests that expect the round trip to be cut off.
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(100);
