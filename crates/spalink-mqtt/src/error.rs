use thiserror::Error;

/// Failures in the bus plumbing layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("broker request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("bus bridge stopped: {0}")]
    Stopped(String),
}
