use std::path::PathBuf;

use tracing::info;

use parksim::config::Config;
use parksim::engine::ParkingSystem;
use parksim::script;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let path: PathBuf = match std::env::args_os().nth(1) {
        Some(p) => p.into(),
        None => {
            eprintln!("usage: parksim <scenario.json>");
            std::process::exit(2);
        }
    };

    let config = Config::from_env();
    let metrics = parksim::observability::init(config.metrics);
    info!("scenario: {}", path.display());
    info!(
        "  penalties: cross_zone={} cancellation={}",
        config.penalties.cross_zone, config.penalties.cancellation
    );
    info!("  metrics: {}", if metrics.is_some() { "enabled" } else { "disabled" });

    let raw = std::fs::read_to_string(&path)?;
    let scenario = script::parse_scenario(&raw)?;
    let mut system = ParkingSystem::from_config(&config);
    let report = script::run(&mut system, &scenario)?;

    let failed = report.outcomes.iter().filter(|o| !o.ok).count();
    info!(
        "done: {} operations, {failed} failed, {} rollbacks",
        report.outcomes.len(),
        report.total_rollbacks
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }
    Ok(())
}
