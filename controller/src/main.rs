//! Composition root for `agency-controller` (spec §4.6, §6): loads config,
//! connects the Store, wires the Scheduler's collaborators, binds the
//! mailbox, runs startup recovery, then serializes schedule passes off
//! mailbox triggers — one pass to completion, then the next — honoring
//! `scheduling_interval_sec` as a minimum gap between passes. Grounded on
//! `backend/src/main.rs`'s composition-root style: dependencies are
//! constructed explicitly here, no DI container.

mod cli;
mod mailbox;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::config::AppConfig;
use common::logger::init_tracing;
use common::model::{Gpu, Hardware, Node, NodeLiveness};
use mailbox::Mailbox;
use nodeagent::HttpNodeAgentClient;
use notifier::WebhookNotifier;
use scheduler::{Scheduler, SchedulerConfig};
use secretclient::HttpSecretClient;
use store::{Db, SqliteStore, Store};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    let args = cli::Args::parse();
    let config_path = AppConfig::resolve_path(args.config);

    let config = match AppConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "invalid configuration");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "controller exited with a runtime error");
            ExitCode::from(2)
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let db = Db::connect(&config.store.database_url).await?;
    db.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new((*db.pool).clone()));

    seed_declared_nodes(&store, &config).await?;

    let secrets = Arc::new(HttpSecretClient::new(
        config.trustee.url.clone(),
        config.trustee.username.clone(),
        config.trustee.password.clone(),
    )?);
    let agents = Arc::new(HttpNodeAgentClient::new()?);
    let notifier = Arc::new(WebhookNotifier::new(store.clone())?);

    let scheduler_config = SchedulerConfig {
        node_timeout_sec: config.controller.node_timeout_sec,
        max_launch_attempts: config.controller.max_launch_attempts,
        retry_limit: config.controller.retry_limit,
        rpc_timeout_sec: config.controller.rpc_timeout_sec,
    };
    let callback_base_url = config.broker.external_url.clone();
    let scheduler = Scheduler::new(store, secrets, agents, notifier, scheduler_config, callback_base_url);

    let socket_path = std::path::PathBuf::from(&config.controller.bind_socket_path);
    let mut mailbox = Mailbox::bind(&socket_path)?;

    info!(socket = %socket_path.display(), "controller starting, running startup recovery");
    if let Err(e) = scheduler.recover_on_startup().await {
        warn!(error = %e, "startup recovery pass failed, will retry on next trigger");
    }

    let min_gap = Duration::from_secs(config.controller.scheduling_interval_sec.max(1));

    loop {
        tokio::select! {
            _ = mailbox.recv() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
        }

        let pass_start = tokio::time::Instant::now();
        if let Err(e) = scheduler.run_pass().await {
            error!(error = %e, "schedule pass failed");
            mailbox.self_trigger();
        }

        let elapsed = pass_start.elapsed();
        if elapsed < min_gap {
            tokio::time::sleep(min_gap - elapsed).await;
        }
    }
}

/// Inserts nodes declared in config that the Store has never seen. An
/// already-known node keeps its persisted liveness/committed resources —
/// config is only the source of truth for a node's *existence* and static
/// hardware, never a restart-time reset of in-flight reservations.
async fn seed_declared_nodes(store: &Arc<dyn Store>, config: &AppConfig) -> anyhow::Result<()> {
    for declared in &config.controller.docker.nodes {
        if store.get_node(&declared.node_name).await?.is_some() {
            continue;
        }
        let node = Node {
            node_name: declared.node_name.clone(),
            url: declared.url.clone(),
            hardware: Hardware {
                ram_mb: declared.hardware.ram_mb,
                gpus: declared
                    .hardware
                    .gpus
                    .iter()
                    .map(|g| Gpu { id: g.id.clone(), vendor: g.vendor.clone(), vram_mb: g.vram_mb })
                    .collect(),
            },
            liveness: NodeLiveness::Unknown,
            ram_committed_mb: 0,
            gpus_committed: vec![],
        };
        store.upsert_node(&node).await?;
    }
    Ok(())
}
