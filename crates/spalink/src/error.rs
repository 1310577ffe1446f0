// CLI-level error type with process exit codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] spalink_config::ConfigError),

    #[error(transparent)]
    Core(#[from] spalink_core::CoreError),

    #[error("bus error: {0}")]
    Bus(#[from] spalink_mqtt::BusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(spalink_core::CoreError::AuthenticationFailed { .. }) => 3,
            Self::Core(_) | Self::Bus(_) => 1,
            Self::Io(_) => 4,
        }
    }
}
