//! REST operations against the Nomiku / Tender API.
//!
//! ## Endpoints
//!
//! | Operation | Request | Success |
//! |-----------|---------|---------|
//! | authenticate | `POST users/auth` (form) | `201 {user_id, api_token}` |
//! | get_user | `GET users/{id}` | `200 {user}` |
//! | get_devices | `GET devices` | `200 {devices}` |
//! | get_device_session | `GET devices/{id}/session` | `200` session descriptor |
//! | get_device_state | `GET {base_url}{path}?auth={session_token}` | `200` telemetry |
//! | set_device_state | `POST devices/{id}/set` (JSON `{state}`) | `201` |
//!
//! Every operation validates its inputs and the session before touching the
//! network. Nothing is retried.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::device::{Device, DeviceSession};
use crate::error::{NomikuError, NomikuResult};
use crate::session::Session;

/// Header carrying the API token.
pub const API_TOKEN_HEADER: &str = "X-Api-Token";

/// Which user to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    /// The authenticated user.
    Me,
    /// A user by id.
    Id(String),
}

impl From<&str> for UserRef {
    fn from(s: &str) -> Self {
        if s == "me" {
            Self::Me
        } else {
            Self::Id(s.to_string())
        }
    }
}

impl From<String> for UserRef {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<u64> for UserRef {
    fn from(id: u64) -> Self {
        Self::Id(id.to_string())
    }
}

/// Level of detail for a user lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserKind {
    /// Public fields, no token required.
    #[default]
    Basic,
    /// All fields, token required.
    Full,
}

impl UserKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Full => "full",
        }
    }
}

/// Credentials established by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: u64,
    pub token: String,
}

/// The service has sent user ids both as numbers and as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct AuthResponse {
    user_id: RawUserId,
    api_token: String,
}

impl AuthResponse {
    fn into_credentials(self) -> NomikuResult<Credentials> {
        let user_id = match self.user_id {
            RawUserId::Number(id) => id,
            RawUserId::Text(text) => text.trim().parse().map_err(|_| {
                NomikuError::InvalidResponse(format!("user_id is not numeric: {:?}", text))
            })?,
        };
        if user_id == 0 || self.api_token.is_empty() {
            return Err(NomikuError::InvalidResponse(
                "auth response carries an empty user_id or api_token".to_string(),
            ));
        }
        Ok(Credentials {
            user_id,
            token: self.api_token,
        })
    }
}

/// HTTP side of the client.
#[derive(Debug, Clone)]
pub struct RestApi {
    client: Client,
    api_url: String,
}

impl RestApi {
    /// Build the HTTP client from the configuration.
    pub fn new(config: &ClientConfig) -> NomikuResult<Self> {
        let client = Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self {
            client,
            api_url: config.normalized_api_url(),
        })
    }

    /// Base URL, always ending in `/`.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Log in and store the returned user id and token in `session`.
    pub async fn authenticate(
        &self,
        session: &mut Session,
        email: &str,
        password: &str,
    ) -> NomikuResult<Credentials> {
        if email.is_empty() || password.is_empty() {
            return Err(NomikuError::BadParameters(
                "You failed to provide either an email or password to authenticate against"
                    .to_string(),
            ));
        }

        let url = self.endpoint("users/auth");
        diag!(session, "Authenticating against url={} with email={}", url, email);

        let response = self
            .client
            .post(&url)
            .form(&[("email", email), ("password", password)])
            .send()
            .await?;
        let body = expect_status(response, StatusCode::CREATED).await?;

        let credentials = decode::<AuthResponse>(body, "auth response")?.into_credentials()?;
        session.set_credentials(credentials.user_id, credentials.token.clone());
        diag!(session, "Authenticated as user {}", credentials.user_id);

        Ok(credentials)
    }

    /// Fetch a user record. `UserRef::Me` resolves to the authenticated user.
    pub async fn get_user(
        &self,
        session: &Session,
        user: &UserRef,
        kind: UserKind,
    ) -> NomikuResult<Value> {
        let user_id = match user {
            UserRef::Id(id) if id.is_empty() => return Err(NomikuError::missing("userID")),
            UserRef::Id(id) => id.clone(),
            UserRef::Me => session.user_id().map(|id| id.to_string()).ok_or_else(|| {
                NomikuError::AuthenticationRequired(
                    "You must authenticate first! 'me' needs a logged in user".to_string(),
                )
            })?,
        };
        diag!(session, "Getting {} user info for user {}", kind.as_str(), user_id);

        let mut request = self.client.get(self.endpoint(&format!("users/{}", user_id)));
        if kind == UserKind::Full {
            let token = session.token().ok_or_else(|| {
                NomikuError::AuthenticationRequired(
                    "You must authenticate first! 'full' user info needs an API token".to_string(),
                )
            })?;
            request = request.header(API_TOKEN_HEADER, token);
        }

        let body = expect_status(request.send().await?, StatusCode::OK).await?;
        take_field(body, "user")
    }

    /// List the devices registered to the authenticated user.
    pub async fn get_devices(&self, session: &Session) -> NomikuResult<Vec<Device>> {
        let request = self.authorized(session, self.client.get(self.endpoint("devices")))?;
        diag!(session, "Getting device list");

        let body = expect_status(request.send().await?, StatusCode::OK).await?;
        decode(take_field(body, "devices")?, "device list")
    }

    /// Look up the live telemetry session of a device.
    pub async fn get_device_session(
        &self,
        session: &Session,
        device_id: &str,
    ) -> NomikuResult<DeviceSession> {
        let token = require_token(session)?;
        if device_id.is_empty() {
            return Err(NomikuError::missing("deviceID"));
        }
        diag!(session, "Getting device '{}' session", device_id);

        let response = self
            .client
            .get(self.endpoint(&format!("devices/{}/session", device_id)))
            .header(API_TOKEN_HEADER, token)
            .send()
            .await?;
        let body = expect_status(response, StatusCode::OK).await?;
        decode(body, "device session")
    }

    /// Fetch raw telemetry: session lookup first, then the telemetry URL.
    ///
    /// The second request is only made when the first one succeeded.
    pub async fn get_device_state(
        &self,
        session: &Session,
        device_id: &str,
    ) -> NomikuResult<Value> {
        let descriptor = self.get_device_session(session, device_id).await?;
        let token = require_token(session)?;

        diag!(session, "Getting device '{}' state info", device_id);
        let response = self
            .client
            .get(descriptor.telemetry_url())
            .query(&[("auth", descriptor.session_token.as_str())])
            .header(API_TOKEN_HEADER, token)
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await
    }

    /// Request a new device state. Re-fetch to observe the change.
    pub async fn set_device_state(
        &self,
        session: &Session,
        device_id: &str,
        desired_state: Value,
    ) -> NomikuResult<Value> {
        let token = require_token(session)?;
        if device_id.is_empty() {
            return Err(NomikuError::missing("deviceID"));
        }
        if is_missing(&desired_state) {
            return Err(NomikuError::missing("deviceState"));
        }
        diag!(session, "Set device '{}' state to {}", device_id, desired_state);

        let response = self
            .client
            .post(self.endpoint(&format!("devices/{}/set", device_id)))
            .header(API_TOKEN_HEADER, token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "state": desired_state }))
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await
    }

    fn authorized(
        &self,
        session: &Session,
        request: RequestBuilder,
    ) -> NomikuResult<RequestBuilder> {
        Ok(request.header(API_TOKEN_HEADER, require_token(session)?))
    }
}

fn require_token(session: &Session) -> NomikuResult<&str> {
    session.token().ok_or_else(NomikuError::not_authenticated)
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Check the status and read the body.
///
/// Empty bodies become `Null`; bodies that are not JSON are kept as a string.
async fn expect_status(response: Response, expected: StatusCode) -> NomikuResult<Value> {
    let status = response.status();
    if status != expected {
        return Err(NomikuError::BadHttpResponseCode(status.as_u16()));
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn take_field(body: Value, field: &str) -> NomikuResult<Value> {
    match body {
        Value::Object(mut map) => map.remove(field).ok_or_else(|| {
            NomikuError::InvalidResponse(format!("response has no '{}' field", field))
        }),
        _ => Err(NomikuError::InvalidResponse(format!(
            "expected a JSON object carrying '{}'",
            field
        ))),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> NomikuResult<T> {
    serde_json::from_value(value)
        .map_err(|e| NomikuError::InvalidResponse(format!("malformed {}: {}", what, e)))
}
