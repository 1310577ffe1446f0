// Cloud API HTTP client
//
// Wraps `reqwest::Client` with token handling, URL construction, and
// response classification. All methods return decoded payloads -- the
// HTTP layer (status codes, retry-after headers) is translated into the
// `Error` taxonomy before the caller sees it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::auth::{Credentials, LoginRequest, LoginResponse, TokenState};
use crate::error::Error;
use crate::models::{
    Account, ConfigPatch, LightPatch, LightsResponse, PumpsResponse, SpaInfo, SpaListResponse,
    SpaStatus,
};
use crate::transport::TransportConfig;

/// Raw HTTP client for the spa vendor cloud.
///
/// Owns the bearer-token lifecycle: the first request logs in, and a
/// token nearing expiry is refreshed transparently before the next call.
/// Safe to share behind an `Arc`; the token slot is the only mutable
/// state.
pub struct SpaClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    token: Mutex<Option<TokenState>>,
    timeout_secs: u64,
}

impl SpaClient {
    /// Create a new client from a `TransportConfig`. Does not log in --
    /// the first authenticated request triggers that.
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            credentials,
            token: Mutex::new(None),
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// The cloud base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Log in and cache the bearer token. Called automatically, but
    /// exposed so connection setup can fail fast on bad credentials.
    pub async fn login(&self) -> Result<(), Error> {
        let url = self.api_url("auth/login");
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .json(&LoginRequest::new(&self.credentials))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: "cloud rejected the configured credentials".into(),
            });
        }

        let login: LoginResponse = Self::decode(resp).await?;
        *self.token.lock().await = Some(TokenState::from_login(login));
        debug!("cloud login successful");
        Ok(())
    }

    /// Current bearer token, refreshing via login when stale.
    async fn bearer(&self) -> Result<String, Error> {
        {
            let guard = self.token.lock().await;
            if let Some(state) = guard.as_ref() {
                if state.is_fresh() {
                    return Ok(state.token.clone());
                }
            }
        }
        self.login().await?;
        let guard = self.token.lock().await;
        guard
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(Error::TokenExpired)
    }

    // ── Account & spa discovery ─────────────────────────────────────

    /// The account the configured credentials belong to.
    pub async fn account(&self) -> Result<Account, Error> {
        self.get("accounts/me").await
    }

    /// List all spas registered to an account.
    pub async fn list_spas(&self, account_id: &str) -> Result<Vec<SpaInfo>, Error> {
        let resp: SpaListResponse = self.get(&format!("accounts/{account_id}/spas")).await?;
        Ok(resp.content)
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Spa-level status (heater, water temperature, heat mode).
    pub async fn status(&self, spa_id: &str) -> Result<SpaStatus, Error> {
        self.get(&format!("spas/{spa_id}/status")).await
    }

    /// Per-pump state.
    pub async fn pumps(&self, spa_id: &str) -> Result<PumpsResponse, Error> {
        self.get(&format!("spas/{spa_id}/pumps")).await
    }

    /// Per-zone light state, including raw color channel readback.
    pub async fn lights(&self, spa_id: &str) -> Result<LightsResponse, Error> {
        self.get(&format!("spas/{spa_id}/lights")).await
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Apply a mode/intensity/color patch to a light zone.
    pub async fn set_light(&self, spa_id: &str, zone: u8, patch: &LightPatch) -> Result<(), Error> {
        self.patch(&format!("spas/{spa_id}/lights/{zone}"), patch)
            .await
    }

    /// Toggle a pump through its state cycle (OFF -> LOW/HIGH -> OFF).
    pub async fn toggle_pump(&self, spa_id: &str, pump_id: &str) -> Result<(), Error> {
        self.post_empty(&format!("spas/{spa_id}/pumps/{pump_id}/toggle"))
            .await
    }

    /// Apply a heater configuration patch (setpoint and/or heat mode).
    pub async fn set_config(&self, spa_id: &str, patch: &ConfigPatch) -> Result<(), Error> {
        self.patch(&format!("spas/{spa_id}/config"), patch).await
    }

    // ── URL builder ─────────────────────────────────────────────────

    /// Build a full URL for an API path under `/v1/`.
    fn api_url(&self, path: &str) -> Url {
        let full = format!("{}v1/{path}", self.base_url);
        Url::parse(&full).expect("invalid API URL")
    }

    // ── Request helpers ─────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let token = self.bearer().await?;
        let url = self.api_url(path);
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        Self::decode(resp).await
    }

    async fn patch(&self, path: &str, body: &impl Serialize) -> Result<(), Error> {
        let token = self.bearer().await?;
        let url = self.api_url(path);
        debug!("PATCH {url}");

        let resp = self
            .http
            .patch(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        Self::check_status(resp).await.map(|_| ())
    }

    async fn post_empty(&self, path: &str) -> Result<(), Error> {
        let token = self.bearer().await?;
        let url = self.api_url(path);
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        Self::check_status(resp).await.map(|_| ())
    }

    /// Translate a reqwest send error, distinguishing hard timeouts.
    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(e)
        }
    }

    /// Classify a non-success status into the error taxonomy.
    ///
    /// Returns the response untouched on 2xx so callers can decode it.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let path = resp.url().path().to_owned();
        match status.as_u16() {
            401 => Err(Error::TokenExpired),
            400 | 422 => {
                let message = Self::error_message(resp).await;
                Err(Error::Rejected {
                    message,
                    status: status.as_u16(),
                })
            }
            404 => Err(Error::NotFound { path }),
            429 => {
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30);
                Err(Error::RateLimited { retry_after_secs })
            }
            _ => {
                let message = Self::error_message(resp).await;
                Err(Error::Api {
                    message,
                    status: status.as_u16(),
                })
            }
        }
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let resp = Self::check_status(resp).await?;
        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Best-effort extraction of `{"message": ...}` from an error body.
    async fn error_message(resp: reqwest::Response) -> String {
        let body = resp.text().await.unwrap_or_default();
        serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(body)
    }
}
