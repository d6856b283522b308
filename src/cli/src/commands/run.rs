//! `a3s-watch run` command: run the watch daemon.

use std::sync::Arc;

use a3s_watch_core::WatchConfig;
use a3s_watch_runtime::{ComponentManager, HttpEngineFactory, StaticDeviceDirectory};
use clap::Args;

#[derive(Args)]
pub struct RunArgs {
    /// Exit with an error when any component fails to register
    #[arg(long)]
    pub strict: bool,

    /// Print the metrics exposition on shutdown
    #[arg(long)]
    pub print_metrics: bool,
}

pub async fn execute(args: RunArgs, config: WatchConfig) -> anyhow::Result<()> {
    let directory = StaticDeviceDirectory::from_config(&config.devices)?;
    let manager = ComponentManager::with_defaults(
        &config,
        Arc::new(directory),
        Arc::new(HttpEngineFactory),
    )?;

    let failures = manager.register_from_config(&config).await;
    for (id, e) in &failures {
        tracing::error!(component = %id, error = %e, "Component not started");
    }
    if args.strict && !failures.is_empty() {
        manager.shutdown().await;
        anyhow::bail!("{} component(s) failed to register", failures.len());
    }

    tracing::info!(
        components = manager.list().len(),
        "a3s-watch running; press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    manager.shutdown().await;
    if args.print_metrics {
        println!("{}", manager.context().metrics.render()?);
    }
    Ok(())
}
