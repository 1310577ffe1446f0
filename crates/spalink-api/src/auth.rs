// Credential handling for the cloud API.
//
// The cloud issues short-lived bearer tokens from a password login.
// `TokenState` tracks expiry so the client can re-login just before a
// token lapses instead of bouncing off 401s mid-poll.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Account credentials for the vendor cloud.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

impl<'a> LoginRequest<'a> {
    pub(crate) fn new(creds: &'a Credentials) -> Self {
        Self {
            email: &creds.email,
            password: creds.password.expose_secret(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
}

/// A live bearer token with its expiry instant.
#[derive(Debug, Clone)]
pub(crate) struct TokenState {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

impl TokenState {
    pub(crate) fn from_login(resp: LoginResponse) -> Self {
        Self {
            token: resp.access_token,
            expires_at: Utc::now() + Duration::seconds(resp.expires_in),
        }
    }

    /// Whether the token is still usable (with a safety margin).
    pub(crate) fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}
