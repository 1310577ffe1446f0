// ── Core error types ──
//
// Domain-facing errors from spalink-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<spalink_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the cloud gateway: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Gateway disconnected")]
    GatewayDisconnected,

    #[error("Gateway call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Command errors ───────────────────────────────────────────────
    /// The gateway refused the command as malformed. Fatal for this
    /// command -- never retried with the same payload.
    #[error("Command rejected: {message}")]
    Validation { message: String },

    /// The gateway is rate limiting us. Callers must back off for at
    /// least the indicated window before the next attempt.
    #[error("Throttled by gateway -- back off {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    /// Another command for the same (target, property) key is in
    /// flight. Fails fast; the caller may retry later.
    #[error("Property busy: {key}")]
    Busy { key: String },

    // ── Sweep errors ─────────────────────────────────────────────────
    #[error("A capability sweep is already running")]
    SweepAlreadyRunning,

    #[error("No capability sweep is running")]
    SweepNotRunning,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Spa not found: {identifier}")]
    TargetNotFound { identifier: String },

    #[error("Component not found: {identifier}")]
    ComponentNotFound { identifier: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Cloud API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transient transport-class failures worth a short retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }

    /// Fatal request-validation failures -- never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Rate-limit rejections requiring global backoff.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Failures that should halt a running sweep entirely rather than
    /// skip the current unit (credentials gone, gateway unreachable).
    pub fn halts_sweep(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::GatewayDisconnected
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<spalink_api::Error> for CoreError {
    fn from(err: spalink_api::Error) -> Self {
        match err {
            spalink_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            spalink_api::Error::TokenExpired => CoreError::AuthenticationFailed {
                message: "access token expired -- re-authentication required".into(),
            },
            spalink_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            spalink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            spalink_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            spalink_api::Error::RateLimited { retry_after_secs } => {
                CoreError::Throttled { retry_after_secs }
            }
            spalink_api::Error::Rejected { message, .. } => CoreError::Validation { message },
            spalink_api::Error::NotFound { path } => {
                CoreError::ComponentNotFound { identifier: path }
            }
            spalink_api::Error::Api { message, status } => CoreError::Api {
                message,
                status: Some(status),
            },
            spalink_api::Error::Deserialization { message, .. } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_maps_to_throttled() {
        let err: CoreError = spalink_api::Error::RateLimited {
            retry_after_secs: 12,
        }
        .into();
        assert!(err.is_throttled());
        assert!(!err.is_transient());
    }

    #[test]
    fn rejection_maps_to_validation() {
        let err: CoreError = spalink_api::Error::Rejected {
            message: "bad mode".into(),
            status: 400,
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = CoreError::Api {
            message: "bad gateway".into(),
            status: Some(502),
        };
        assert!(err.is_transient());

        let err = CoreError::Api {
            message: "conflict".into(),
            status: Some(409),
        };
        assert!(!err.is_transient());
    }
}
