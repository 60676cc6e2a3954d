// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::Parser;
use collabcore::config::EngineConfig;
use collabcore::document::{DocumentId, ReplicationStrategy};
use collabcore::fabric::InstanceId;
use collabcore::instance::Instance;
use collabcore::logging;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the engine's `.ini` configuration file. Missing keys (or a
    /// missing file entirely) fall back to the documented defaults.
    #[arg(long, env = "COLLAB_CONFIG")]
    config: Option<PathBuf>,

    /// Numeric identity of this instance within the fleet, used to tag
    /// fabric messages and to suppress loopback.
    #[arg(long, env = "COLLAB_INSTANCE_ID", default_value_t = 1)]
    instance_id: u64,

    /// Verbose (debug-level) logging.
    #[arg(long)]
    debug: bool,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let cli = Cli::parse();

    logging::initialize(cli.debug);

    let config = cli.config.as_deref().map_or_else(EngineConfig::default, EngineConfig::from_config_file);
    let config = config.merge_env();

    let instance = Instance::new(InstanceId(cli.instance_id), config);

    info!(instance = instance.id().0, "collabcore instance starting");

    // A single demo document so the process has something to serve; a
    // real deployment opens documents on demand as clients join them.
    instance.open_document(DocumentId(1), ReplicationStrategy::Ot, "", now_millis());

    run_until_shutdown(&instance)
        .await
        .context("instance supervisor loop failed")?;

    instance.shutdown(now_millis()).await;
    info!("collabcore instance stopped");
    Ok(())
}

/// Drives periodic maintenance (gap-timeout checks, cache sweeps) on every
/// open document until a shutdown signal arrives. Suspension points are
/// exactly the ones named in the concurrency model: waiting on a tick
/// interval and waiting on the signal itself; nothing here is CPU-bound.
async fn run_until_shutdown(instance: &Instance) -> Result<()> {
    let mut ticker = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(handle) = instance.document(DocumentId(1)) {
                    let resyncs = handle.tick(now_millis()).await;
                    if !resyncs.is_empty() {
                        debug!(count = resyncs.len(), "resync requests pending delivery to transport");
                    }
                }
            }
            () = wait_for_shutdown_signal() => {
                debug!("shutdown signal received, draining");
                return Ok(());
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
