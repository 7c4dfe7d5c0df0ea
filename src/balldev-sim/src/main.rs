// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod sim;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use balldev_app::{init_logging, normalize_name};
use balldev_core::{
    spawn_outgoing_task, DynResult, EjectError, EjectEventEmitter, EjectReport, EjectResult,
    EjectTarget, OutgoingHandle, OutgoingTaskConfig,
};

use config::SimConfig;
use sim::SimDevice;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - ball device eject simulator");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

/// One printed line per finished eject request.
#[derive(Debug, Serialize)]
struct Outcome {
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<EjectReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<EjectError>,
}

impl Outcome {
    fn new(source: &str, result: EjectResult<EjectReport>) -> Self {
        let (report, error) = match result {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            source: source.to_string(),
            report,
            error,
        }
    }
}

type PendingEject = (String, oneshot::Receiver<EjectResult<EjectReport>>);

fn spawn_device_tasks(
    cfg: &SimConfig,
    devices: &HashMap<String, Arc<SimDevice>>,
) -> Vec<(OutgoingHandle, JoinHandle<EjectResult<()>>)> {
    cfg.devices
        .iter()
        .filter(|d| d.target.is_some())
        .filter_map(|d| devices.get(&normalize_name(&d.id)).map(|dev| (d, dev)))
        .map(|(d, device)| {
            spawn_outgoing_task(OutgoingTaskConfig {
                device: d.id.clone(),
                counter: device.clone(),
                ejector: device.clone(),
                control: device.clone(),
                policy: d.policy(),
                emitter: EjectEventEmitter::new(),
            })
        })
        .collect()
}

fn enqueue_ejects(
    cfg: &SimConfig,
    devices: &HashMap<String, Arc<SimDevice>>,
    handles: &[(OutgoingHandle, JoinHandle<EjectResult<()>>)],
) -> DynResult<Vec<PendingEject>> {
    let mut pending = Vec::new();
    for eject in &cfg.ejects {
        let source = normalize_name(&eject.source);
        let device_cfg = cfg
            .device(&eject.source)
            .ok_or_else(|| format!("Unknown eject source: {}", eject.source))?;
        let target = devices
            .get(&source)
            .and_then(|d| d.target())
            .ok_or_else(|| format!("Eject source {} has no target", eject.source))?;
        let (handle, _) = handles
            .iter()
            .find(|(h, _)| normalize_name(&h.device) == source)
            .ok_or_else(|| format!("No outgoing task for {}", eject.source))?;

        let policy = device_cfg.policy();
        for _ in 0..eject.count {
            let (request, rx) = policy.request_to(target.clone()).with_response();
            info!(
                "Queueing eject {} from {} to {}",
                request.id,
                eject.source,
                target.name()
            );
            handle.enqueue_eject(request)?;
            pending.push((eject.source.clone(), rx));
        }
    }
    Ok(pending)
}

async fn collect_outcomes(pending: Vec<PendingEject>) -> DynResult<()> {
    for (source, rx) in pending {
        let result = rx
            .await
            .unwrap_or_else(|_| Err(EjectError::QueueClosed(source.clone())));
        println!("{}", serde_json::to_string(&Outcome::new(&source, result))?);
    }
    Ok(())
}

fn report_final_state(handle: &OutgoingHandle) {
    let state = handle.state();
    if state.is_disabled() {
        warn!("{} needs attention: {}", handle.device, state);
    } else if state.ball_in_flight() {
        warn!("{} still has a ball in flight: {}", handle.device, state);
    } else if state.is_busy() {
        info!("{} interrupted while {}", handle.device, state);
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", SimConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        (SimConfig::load_from_file(path)?, Some(path.clone()))
    } else {
        SimConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid balldev-sim configuration: {}", e))?;

    init_logging(cli.log_level.as_deref().or(cfg.general.log_level.as_deref()));

    match config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => warn!("No configuration file found; nothing to simulate"),
    }

    let devices = sim::build_devices(&cfg);
    let handles = spawn_device_tasks(&cfg, &devices);
    info!("Started {} outgoing task(s)", handles.len());

    let pending = enqueue_ejects(&cfg, &devices, &handles)?;

    tokio::select! {
        result = collect_outcomes(pending) => result?,
        _ = signal::ctrl_c() => info!("Ctrl+C received, shutting down"),
    }

    // Closing the queues lets idle tasks finish on their own.
    let tasks: Vec<(String, JoinHandle<EjectResult<()>>)> = handles
        .into_iter()
        .map(|(handle, task)| {
            report_final_state(&handle);
            (handle.device.clone(), task)
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for (device, task) in tasks {
        if !task.is_finished() {
            task.abort();
        }
        if let Ok(Err(e)) = task.await {
            error!("Outgoing task for {} failed: {}", device, e);
        }
    }
    Ok(())
}
