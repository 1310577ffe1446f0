// Foreground capability sweep with console progress.

use spalink_config::Config;
use spalink_core::sweep::SweepReport;
use spalink_core::sweep::SweepStore;
use spalink_core::SweepPhase;

use crate::cli::SweepArgs;
use crate::commands::build_bridge;
use crate::error::CliError;

pub async fn handle(args: &SweepArgs, config: &Config) -> Result<(), CliError> {
    let (bridge, store) = build_bridge(config)?;
    bridge.connect().await?;

    let mut progress = bridge.progress().subscribe();
    bridge.start_sweep(!args.fresh).await?;
    println!("sweep started -- ctrl-c stops at the next unit boundary");

    let mut last_percent = u8::MAX;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("stop requested, finishing current unit...");
                let _ = bridge.stop_sweep();
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = progress.borrow_and_update().clone();
                match snapshot.phase {
                    SweepPhase::Running if snapshot.percent != last_percent => {
                        last_percent = snapshot.percent;
                        let unit = snapshot
                            .current_unit
                            .map_or_else(String::new, |u| format!(" -- {u}"));
                        println!(
                            "{:3}% ({}/{}){unit}",
                            snapshot.percent,
                            snapshot.completed_units,
                            snapshot.total_units,
                        );
                    }
                    SweepPhase::CoolingDown => println!("rate limited, cooling down..."),
                    SweepPhase::Completed | SweepPhase::Stopped => break,
                    _ => {}
                }
            }
        }
    }

    if let Some(report) = store.load(&bridge.primary_target()?).await? {
        print_summary(&report);
        println!("results written to {}", store.path().display());
    }

    bridge.disconnect().await;
    Ok(())
}

fn print_summary(report: &SweepReport) {
    println!();
    println!(
        "sweep {}: {}/{} units confirmed",
        if report.stopped_early {
            "stopped early"
        } else {
            "complete"
        },
        report.success_count(),
        report.total_tests(),
    );
    for zone in report.zones() {
        let summary = report.zone_summary(zone);
        println!("zone {zone}:");
        for (mode, support) in &summary.supported_modes {
            let levels: Vec<String> = support.levels.iter().map(ToString::to_string).collect();
            let sample = support
                .sample
                .map_or_else(String::new, |c| format!("  sample {}", c.to_hex()));
            println!("  {mode}: levels [{}]{sample}", levels.join(", "));
        }
        for mode in &summary.unsupported_modes {
            println!("  {mode}: unsupported");
        }
    }
}
