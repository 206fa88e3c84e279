use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libmfs::config::load_config;
use libmfs::{MfsHandler, MountState, logging};
use tracing::warn;

#[derive(Parser)]
#[command(name = "mfsctl")]
#[command(about = "Manage MooseFS backed volumes", long_about = None)]
struct Cli {
    /// Handler configuration (YAML)
    #[arg(short, long, value_name = "FILE", default_value = "/etc/mfs/mfsctl.yaml")]
    config: PathBuf,

    /// Also write logs into the plugin logs directory of the mount
    #[arg(long)]
    log_to_mfs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "(Re)mount MooseFS at the host mount path")]
    Mount,
    #[command(about = "Check whether a volume exists")]
    Exists {
        volume_id: String,
        /// Check the mount volume instead
        #[arg(long)]
        mount_volume: bool,
    },
    #[command(about = "Create a volume, optionally with a quota in bytes")]
    Create {
        volume_id: String,
        #[arg(short, long, default_value_t = 0)]
        size: i64,
    },
    #[command(about = "Create a mount volume directory")]
    CreateMountVolume { volume_id: String },
    #[command(about = "Delete a volume and everything in it")]
    Delete { volume_id: String },
    #[command(about = "Print the quota of a volume in bytes")]
    GetQuota { volume_id: String },
    #[command(about = "Set the quota of a volume in bytes")]
    SetQuota { volume_id: String, size: i64 },
    #[command(about = "Snapshot a volume into a new volume")]
    Snapshot {
        volume_id: String,
        snapshot_id: String,
    },
    #[command(about = "Remove a snapshot")]
    RemoveSnapshot { snapshot_id: String },
    #[command(about = "Bind mount a path of the mount onto a target")]
    Bind {
        /// Path relative to the host mount path
        source: String,
        target: PathBuf,
        /// Extra mount options
        #[arg(short, long = "option")]
        options: Vec<String>,
    },
    #[command(about = "Undo a bind mount")]
    Unbind { target: PathBuf },
    #[command(about = "Print the paths derived for a volume")]
    Paths { volume_id: String },
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let logging_config = config.logging.clone();
    let handler = MfsHandler::new(config);

    // The logs directory lives inside the mount, so a file sink only makes
    // sense once MooseFS is up and is never opened by `mount` itself.
    let mut sink = None;
    let mut sink_skipped = false;
    if cli.log_to_mfs && !matches!(cli.command, Commands::Mount) {
        if handler.mount_state(handler.host_mount_path())? == MountState::Mounted {
            sink = Some(handler.log_sink(&logging_config)?);
        } else {
            sink_skipped = true;
        }
    }
    let _guard = logging::init(&logging_config, sink)?;
    if sink_skipped {
        warn!(
            "{} is not mounted, logging to stderr only",
            handler.host_mount_path().display()
        );
    }

    match cli.command {
        Commands::Mount => handler.mount_mfs()?,
        Commands::Exists {
            volume_id,
            mount_volume,
        } => {
            let exists = if mount_volume {
                handler.mount_volume_exists(&volume_id)?
            } else {
                handler.volume_exists(&volume_id)?
            };
            println!("{exists}");
        }
        Commands::Create { volume_id, size } => {
            let acquired = handler
                .create_volume(&volume_id, size)
                .with_context(|| format!("Failed to create volume {volume_id}"))?;
            println!("{acquired}");
        }
        Commands::CreateMountVolume { volume_id } => handler.create_mount_volume(&volume_id)?,
        Commands::Delete { volume_id } => handler
            .delete_volume(&volume_id)
            .with_context(|| format!("Failed to delete volume {volume_id}"))?,
        Commands::GetQuota { volume_id } => println!("{}", handler.get_quota(&volume_id)?),
        Commands::SetQuota { volume_id, size } => {
            println!("{}", handler.set_quota(&volume_id, size)?)
        }
        Commands::Snapshot {
            volume_id,
            snapshot_id,
        } => {
            let size = handler
                .create_snapshot(&volume_id, &snapshot_id)
                .with_context(|| format!("Failed to snapshot {volume_id} into {snapshot_id}"))?;
            println!("{size}");
        }
        Commands::RemoveSnapshot { snapshot_id } => handler.remove_snapshot(&snapshot_id)?,
        Commands::Bind {
            source,
            target,
            options,
        } => handler.bind_mount(&source, &target, &options)?,
        Commands::Unbind { target } => handler.bind_umount(&target)?,
        Commands::Paths { volume_id } => {
            let paths = handler.paths();
            println!("host_mount_path: {}", paths.host_mount_path().display());
            println!("volume: {}", paths.host_volume(&volume_id).display());
            println!("mount_volume: {}", paths.host_mount_volume(&volume_id).display());
            println!("mfs_volume: {}", paths.mfs_volume(&volume_id).display());
            println!("logs: {}", paths.host_logs().display());
        }
    }
    Ok(())
}
