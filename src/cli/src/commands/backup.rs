//! `a3s-watch backup` command: back up a device volume.

use std::path::PathBuf;

use a3s_watch_core::{EventEmitter, WatchConfig};
use a3s_watch_runtime::{
    DeviceDirectory, EngineFactory, HttpEngineFactory, StaticDeviceDirectory, VolumeBackup,
};
use clap::Args;

#[derive(Args)]
pub struct BackupArgs {
    /// Device uuid, as declared in the configuration
    #[arg(long)]
    pub device: String,

    /// Volume to back up
    #[arg(long)]
    pub volume: String,

    /// Destination directory, created if missing
    #[arg(long)]
    pub dest: PathBuf,

    /// Archive file name (default: <volume>-<timestamp>.tar)
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn execute(args: BackupArgs, config: &WatchConfig) -> anyhow::Result<()> {
    let directory = StaticDeviceDirectory::from_config(&config.devices)?;
    let Some(device) = directory.find_device_by_uuid(&args.device).await? else {
        anyhow::bail!("Unknown device: {}", args.device);
    };
    let auth = directory
        .find_auth_by_device_uuid(&args.device)
        .await?
        .unwrap_or_default();

    let engine = HttpEngineFactory.connect(&device, &auth).await?;
    let file_name = args
        .name
        .clone()
        .unwrap_or_else(|| VolumeBackup::default_file_name(&args.volume));
    let path = VolumeBackup::new(engine, EventEmitter::default())
        .backup(&args.volume, &args.dest, &file_name)
        .await?;
    println!("{}", path.display());
    Ok(())
}
