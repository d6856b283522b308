//! CLI command definitions and dispatch.

mod backup;
mod check;
mod components;
mod run;

use std::path::{Path, PathBuf};

use a3s_watch_core::WatchConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};

/// A3S Watch - keeps track of container image updates across devices.
#[derive(Parser)]
#[command(name = "a3s-watch", version, about)]
pub struct Cli {
    /// Configuration file (default: ~/.a3s/watch.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Run every configured watcher until interrupted
    Run(run::RunArgs),
    /// Check an image against its registry
    Check(check::CheckArgs),
    /// Register the configured components and list them
    Components(components::ComponentsArgs),
    /// Back up a volume of a device to a tar archive
    Backup(backup::BackupArgs),
}

/// Load the configuration.
///
/// An explicit path must exist. Without one the default location is used
/// when present, built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<WatchConfig> {
    if let Some(path) = path {
        return WatchConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()));
    }
    let default = WatchConfig::default_path();
    if default.exists() {
        WatchConfig::load(&default)
            .with_context(|| format!("loading configuration from {}", default.display()))
    } else {
        Ok(WatchConfig::default())
    }
}

/// Dispatch a parsed command to its handler.
pub async fn dispatch(command: Command, config: WatchConfig) -> anyhow::Result<()> {
    match command {
        Command::Run(args) => run::execute(args, config).await,
        Command::Check(args) => check::execute(args, &config).await,
        Command::Components(args) => components::execute(args, &config).await,
        Command::Backup(args) => backup::execute(args, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_with_global_flags() {
        let cli = Cli::try_parse_from([
            "a3s-watch",
            "check",
            "ghcr.io/org/app:1.2.3",
            "--arch",
            "arm64",
            "--json",
            "--config",
            "/etc/a3s/watch.yaml",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/a3s/watch.yaml")));
        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.image, "ghcr.io/org/app:1.2.3");
                assert_eq!(args.arch, "arm64");
                assert_eq!(args.os, "linux");
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_parse_backup_requires_volume() {
        assert!(Cli::try_parse_from(["a3s-watch", "backup", "--device", "d-1"]).is_err());
        let cli = Cli::try_parse_from([
            "a3s-watch",
            "backup",
            "--device",
            "d-1",
            "--volume",
            "app_data",
            "--dest",
            "/srv/backups",
        ])
        .unwrap();
        match cli.command {
            Command::Backup(args) => {
                assert_eq!(args.volume, "app_data");
                assert_eq!(args.dest, PathBuf::from("/srv/backups"));
                assert!(args.name.is_none());
            }
            _ => panic!("expected backup"),
        }
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.yaml");
        std::fs::write(
            &path,
            "log_level: debug\nwatchers:\n  - name: edge\n    device_uuid: d-1\n",
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_filter(), "debug");
        assert_eq!(config.watchers.len(), 1);
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("absent.yaml"));
    }
}
