//! Per-adapter session state.
//!
//! Holds the API token, the authenticated user id, the device targeted by the
//! generic MQTT get/set calls, and the debug flag. Setters return `false` and
//! leave the state untouched when handed an empty value.

/// Mutable credentials and targeting state owned by one client.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    user_id: Option<u64>,
    device_id: Option<String>,
    debug: bool,
}

impl Session {
    /// Create a session, optionally seeded with an existing API token.
    pub fn new(token: Option<String>) -> Self {
        let mut session = Self::default();
        if let Some(token) = token {
            session.set_token(token);
        }
        session
    }

    /// Store an API token. Empty tokens are rejected.
    pub fn set_token(&mut self, token: impl Into<String>) -> bool {
        let token = token.into();
        if token.is_empty() {
            return false;
        }
        self.token = Some(token);
        true
    }

    /// Store the user id. Zero is rejected.
    pub fn set_user_id(&mut self, id: u64) -> bool {
        if id == 0 {
            return false;
        }
        self.user_id = Some(id);
        true
    }

    /// Select the device used by the device-scoped MQTT operations.
    pub fn set_device_id(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        diag!(self, "Device ID set to {}", id);
        if id.is_empty() {
            return false;
        }
        self.device_id = Some(id);
        true
    }

    /// Store user id and token together; neither is stored if either is empty.
    pub fn set_credentials(&mut self, user_id: u64, token: impl Into<String>) -> bool {
        let token = token.into();
        if user_id == 0 || token.is_empty() {
            return false;
        }
        self.user_id = Some(user_id);
        self.token = Some(token);
        true
    }

    /// Forget token and user id. The selected device is kept.
    pub fn clear(&mut self) {
        self.token = None;
        self.user_id = None;
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
        diag!(self, "debugging enabled");
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Token and user id are both present, as the MQTT broker requires.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user_id.is_some()
    }
}
