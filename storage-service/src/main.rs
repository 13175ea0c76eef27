// SPDX-License-Identifier: GPL-3.0-only

//! Storage topology daemon and maintenance commands
//!
//! `run` polls the local host's LVM layout and reconciles it into the
//! snapshot store; the other subcommands read or adjust that snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use storage_contracts::TopologyStore;
use storage_service::{
    Reconciler, ServiceConfig, SnapshotStore, SummaryAggregator, SyncCoordinator, poller,
};
use storage_types::{LvKey, NodeId, Registration, TopologyObservation, bytes_to_pretty};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "storage-topologyd")]
#[command(about = "LVM topology reconciler for fleet storage dashboards")]
struct Cli {
    /// Config file (defaults to $STORAGE_TOPOLOGY_CONFIG or /etc/storage-topology/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured state directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll this host and reconcile until interrupted
    Run,
    /// Print this host's current observation as JSON
    Collect,
    /// Reconcile an observation read from a JSON file
    Ingest { file: PathBuf },
    /// Print the per-node summary
    Summary {
        #[arg(long)]
        node: Option<String>,
        /// Human-readable sizes
        #[arg(long)]
        pretty: bool,
    },
    /// List one kind of persisted row
    List {
        kind: ListKind,
        #[arg(long)]
        node: Option<String>,
    },
    /// Link a volume group to a registered storage entry
    RegisterVg {
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        vg: String,
        #[arg(long)]
        storage_id: i64,
        #[arg(long)]
        storage_type: String,
    },
    /// Link a logical volume to a registered storage entry
    RegisterLv {
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        vg: String,
        #[arg(long)]
        lv: String,
        #[arg(long)]
        storage_id: i64,
        #[arg(long)]
        storage_type: String,
    },
    /// Clear a volume group's registration
    UnregisterVg {
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        vg: String,
    },
    /// Clear a logical volume's registration
    UnregisterLv {
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        vg: String,
        #[arg(long)]
        lv: String,
    },
    /// Delete every topology row of a decommissioned node
    Teardown {
        #[arg(long)]
        node: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ListKind {
    PhysicalVolumes,
    VolumeGroups,
    LogicalVolumes,
    ThinPools,
    Disks,
    AvailableDisks,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_store(config: &ServiceConfig) -> Result<Arc<SnapshotStore>> {
    let store = SnapshotStore::open(&config.state_dir)
        .with_context(|| format!("opening store at {}", config.state_dir.display()))?;
    Ok(Arc::new(store))
}

fn read_observation(path: &Path) -> Result<TopologyObservation> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading observation {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing observation {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storage_service=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }
    let node_or_local = |node: Option<String>| {
        node.map(NodeId::new)
            .unwrap_or_else(|| config.node_id())
    };

    match cli.command {
        Command::Run => {
            tracing::info!(
                "Starting storage topology service v{}",
                env!("CARGO_PKG_VERSION")
            );
            let store = open_store(&config)?;
            let reconciler =
                Reconciler::new(store).with_volume_group_pruning(config.volume_group_pruning());
            let coordinator = Arc::new(SyncCoordinator::new(reconciler));

            poller::run_poll_loop(
                coordinator,
                config.node_id(),
                Duration::from_secs(config.poll_interval_secs),
                config.collect_disks,
                poller::shutdown_signal(),
            )
            .await?;
            tracing::info!("Storage topology service shutting down");
        }
        Command::Collect => {
            let node_id = config.node_id();
            let collect_disks = config.collect_disks;
            let observation = tokio::task::spawn_blocking(move || {
                storage_sys::collect_observation(node_id, collect_disks)
            })
            .await??;
            print_json(&observation)?;
        }
        Command::Ingest { file } => {
            let observation = read_observation(&file)?;
            let store = open_store(&config)?;
            let reconciler =
                Reconciler::new(store).with_volume_group_pruning(config.volume_group_pruning());
            let report = SyncCoordinator::new(reconciler).sync(observation).await?;
            print_json(&report)?;
        }
        Command::Summary { node, pretty } => {
            let node_id = node_or_local(node);
            let summary = SummaryAggregator::new(open_store(&config)?).get_summary(&node_id)?;
            if pretty {
                println!("node:              {node_id}");
                println!("volume groups:     {}", summary.vg_count);
                println!("registered:        {}", summary.registered_count);
                println!("thin pools:        {}", summary.thin_pool_count);
                println!("available disks:   {}", summary.available_disk_count);
                println!(
                    "total size:        {}",
                    bytes_to_pretty(&summary.total_vg_size_bytes, true)
                );
                println!(
                    "total free:        {}",
                    bytes_to_pretty(&summary.total_vg_free_bytes, true)
                );
            } else {
                print_json(&summary)?;
            }
        }
        Command::List { kind, node } => {
            let node_id = node_or_local(node);
            let store = open_store(&config)?;
            match kind {
                ListKind::PhysicalVolumes => print_json(&store.list_physical_volumes(&node_id)?)?,
                ListKind::VolumeGroups => print_json(&store.list_volume_groups(&node_id)?)?,
                ListKind::LogicalVolumes => print_json(&store.list_logical_volumes(&node_id)?)?,
                ListKind::ThinPools => print_json(&store.list_thin_pools(&node_id)?)?,
                ListKind::Disks => print_json(&store.list_disks(&node_id)?)?,
                ListKind::AvailableDisks => print_json(&store.list_available_disks(&node_id)?)?,
            }
        }
        Command::RegisterVg {
            node,
            vg,
            storage_id,
            storage_type,
        } => {
            let node_id = node_or_local(node);
            let updated = open_store(&config)?.set_volume_group_registration(
                &node_id,
                &vg,
                Some(Registration::new(storage_id, storage_type)),
            )?;
            print_json(&updated)?;
        }
        Command::RegisterLv {
            node,
            vg,
            lv,
            storage_id,
            storage_type,
        } => {
            let node_id = node_or_local(node);
            let updated = open_store(&config)?.set_logical_volume_registration(
                &node_id,
                &LvKey::new(vg, lv),
                Some(Registration::new(storage_id, storage_type)),
            )?;
            print_json(&updated)?;
        }
        Command::UnregisterVg { node, vg } => {
            let node_id = node_or_local(node);
            let updated =
                open_store(&config)?.set_volume_group_registration(&node_id, &vg, None)?;
            print_json(&updated)?;
        }
        Command::UnregisterLv { node, vg, lv } => {
            let node_id = node_or_local(node);
            let updated = open_store(&config)?.set_logical_volume_registration(
                &node_id,
                &LvKey::new(vg, lv),
                None,
            )?;
            print_json(&updated)?;
        }
        Command::Teardown { node } => {
            let node_id = NodeId::new(node);
            let coordinator = SyncCoordinator::new(Reconciler::new(open_store(&config)?));
            coordinator.teardown(node_id.clone()).await?;
            tracing::info!("Tore down topology of {node_id}");
        }
    }

    Ok(())
}
