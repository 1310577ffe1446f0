// The daemon: bridge + bus until a shutdown signal.

use tracing::info;

use spalink_config::Config;
use spalink_mqtt::{BusBridge, BusSettings, TopicScheme};

use crate::commands::build_bridge;
use crate::error::CliError;

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let (bridge, store) = build_bridge(config)?;
    bridge.connect().await?;

    let settings = BusSettings {
        host: config.mqtt.host.clone(),
        port: config.mqtt.port,
        username: config.mqtt.username.clone(),
        password: config.mqtt.password.clone(),
        client_id: config.mqtt.client_id.clone(),
    };
    let scheme = TopicScheme::new(config.mqtt.base_topic.clone());
    let bus_store: std::sync::Arc<dyn spalink_core::SweepStore> = store;
    let bus = BusBridge::start(bridge.clone(), &settings, scheme, Some(bus_store)).await?;

    info!("bridge running -- send SIGINT or SIGTERM to stop");
    wait_for_shutdown().await;
    info!("shutting down");

    bus.shutdown().await;
    bridge.disconnect().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term =
        signal(SignalKind::terminate()).expect("cannot install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
