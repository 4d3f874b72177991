use anyhow::Result;
use clap::Parser;

use courier_core::config::CourierConfig;
use courier_daemon::cli::DaemonCli;
use courier_daemon::logging::init_tracing;
use courier_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = CourierConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);

    if cli.validate {
        let targets = orchestrator::validate_targets(&config).await?;
        println!("configuration valid: {targets} target(s)");
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "courier-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("courier-daemon shut down");
    Ok(())
}
