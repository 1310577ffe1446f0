// One-shot status: connect, poll, print what the reconciler holds.

use spalink_config::Config;

use crate::commands::build_bridge;
use crate::error::CliError;

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let (bridge, _store) = build_bridge(config)?;
    bridge.connect().await?;

    for target in bridge.targets() {
        println!("spa {target}");
        for component in bridge.reconciler().components_for(&target) {
            println!("  {} ({})", component.id, component.kind);
            for (property, value) in &component.properties {
                println!("    {property}: {value}");
            }
        }
    }

    let errors = bridge.tracker().recent(10);
    if !errors.is_empty() {
        println!();
        println!("recent errors:");
        for error in errors {
            println!(
                "  [{}] {} {}: {}",
                error.timestamp.format("%Y-%m-%d %H:%M:%S"),
                error.severity,
                error.category,
                error.message
            );
        }
    }

    bridge.disconnect().await;
    Ok(())
}
