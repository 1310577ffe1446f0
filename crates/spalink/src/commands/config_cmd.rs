// Config inspection.

use spalink_config::Config;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, config: &Config, path_override: Option<&std::path::Path>) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Path => {
            let path = path_override
                .map_or_else(spalink_config::config_path, std::path::Path::to_path_buf);
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let redacted = redact(config);
            print!("{}", toml::to_string_pretty(&redacted).map_err(spalink_config::ConfigError::from)?);
            Ok(())
        }
    }
}

/// Secrets never hit stdout.
fn redact(config: &Config) -> Config {
    let mut shown = Config {
        cloud: spalink_config::CloudSection {
            base_url: config.cloud.base_url.clone(),
            email: config.cloud.email.clone(),
            password: config.cloud.password.as_ref().map(|_| "<redacted>".into()),
            timeout_secs: config.cloud.timeout_secs,
        },
        mqtt: spalink_config::MqttSection {
            host: config.mqtt.host.clone(),
            port: config.mqtt.port,
            username: config.mqtt.username.clone(),
            password: config.mqtt.password.as_ref().map(|_| "<redacted>".into()),
            base_topic: config.mqtt.base_topic.clone(),
            client_id: config.mqtt.client_id.clone(),
        },
        ..Config::default()
    };
    shown.bridge = spalink_config::BridgeSection {
        poll_interval_secs: config.bridge.poll_interval_secs,
        propagation_delay_ms: config.bridge.propagation_delay_ms,
        reconnect_failure_threshold: config.bridge.reconnect_failure_threshold,
        throttle_base_secs: config.bridge.throttle_base_secs,
        throttle_cap_secs: config.bridge.throttle_cap_secs,
    };
    shown.sweep = spalink_config::SweepSection {
        settle_delay_secs: config.sweep.settle_delay_secs,
        zone_reset_pause_secs: config.sweep.zone_reset_pause_secs,
        reset_every_units: config.sweep.reset_every_units,
        max_throttle_retries: config.sweep.max_throttle_retries,
        levels: config.sweep.levels.clone(),
        results_path: config.sweep.results_path.clone(),
    };
    shown.logging = spalink_config::LoggingSection {
        level: config.logging.level.clone(),
        json: config.logging.json,
        directory: config.logging.directory.clone(),
    };
    shown
}
