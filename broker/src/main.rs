//! Composition root for `agency-broker` (spec §4.2, §6): loads config,
//! connects the Store, wires `Auth` and the outbound `SecretClient`, and
//! serves the HTTP API. Grounded on `backend/src/main.rs`'s composition-root
//! style, generalized from a single `tokio::spawn`ed loop to an axum server.

mod auth_mw;
mod cli;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use auth::{Auth, BlocklistPolicy};
use chrono::Duration as ChronoDuration;
use clap::Parser;
use common::config::AppConfig;
use common::logger::init_tracing;
use common::trigger::TriggerClient;
use secretclient::HttpSecretClient;
use state::AppState;
use store::{Db, SqliteStore, Store};
use tracing::error;

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
            error!(error = %e, "broker exited with a runtime error");
            ExitCode::from(2)
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let db = Db::connect(&config.store.database_url).await?;
    db.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new((*db.pool).clone()));

    let secrets = Arc::new(HttpSecretClient::new(
        config.trustee.url.clone(),
        config.trustee.username.clone(),
        config.trustee.password.clone(),
    )?);

    let session_secret = auth::resolve_session_secret(
        config.broker.auth.jwt.secret_key.as_deref(),
        Path::new(&config.broker.auth.jwt.key_file),
    )?;
    let auth_service = Arc::new(
        Auth::new(store.clone(), session_secret)
            .with_cookie_ttl_secs(config.broker.auth.jwt.access_token_expires)
            .with_blocklist_policy(BlocklistPolicy {
                threshold: config.broker.auth.block_threshold as i64,
                window: ChronoDuration::seconds(config.broker.auth.block_window_sec as i64),
            }),
    );

    let trigger = TriggerClient::new(config.controller.bind_socket_path.clone());

    let state = Arc::new(AppState {
        store,
        auth: auth_service,
        secrets,
        trigger,
    });

    let app = routes::router(state);

    let addr: SocketAddr = config
        .broker
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid broker.bind_addr '{}': {e}", config.broker.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "broker listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
