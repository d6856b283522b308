//! `a3s-watch components` command: list registered components.

use std::sync::Arc;

use a3s_watch_core::WatchConfig;
use a3s_watch_runtime::{ComponentManager, HttpEngineFactory, StaticDeviceDirectory};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct ComponentsArgs {
    /// Only display component ids
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: ComponentsArgs, config: &WatchConfig) -> anyhow::Result<()> {
    let directory = StaticDeviceDirectory::from_config(&config.devices)?;
    let manager = ComponentManager::with_defaults(
        config,
        Arc::new(directory),
        Arc::new(HttpEngineFactory),
    )?;
    let failures = manager.register_from_config(config).await;
    let components = manager.list();

    if args.quiet {
        for component in &components {
            println!("{}", component.id);
        }
    } else {
        let mut table = output::new_table(&["ID", "KIND", "STATE"]);
        for component in &components {
            let state = component
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row([component.id.clone(), component.kind.to_string(), state]);
        }
        for (id, _) in &failures {
            table.add_row([id.clone(), kind_of(id).to_string(), "failed".to_string()]);
        }
        println!("{table}");
    }

    for (id, e) in &failures {
        eprintln!("{id}: {e}");
    }
    manager.shutdown().await;
    Ok(())
}

fn kind_of(id: &str) -> &'static str {
    if id.starts_with("watcher.") {
        "watcher"
    } else {
        "registry"
    }
}
