//! Announce relay bot.
//!
//! Operators send a text or a single photo to the bot, confirm it, and the
//! bot forwards it, with a greeting and two link buttons, to every
//! registered recipient. Senders who are not authorized are recorded so an
//! operator can authorize them later through the operator API.

mod api;
mod config;
mod relay;
mod storage;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use announce_core::{Coordinator, PendingRegistry};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use api::ApiState;
use config::Config;
use storage::Storage;
use telegram::TelegramClient;

/// How long in-flight fan-outs may keep running after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Announce relay {}", env!("BUILD_VERSION"));

    let config = Config::from_env()?;
    let storage = Arc::new(Storage::open(&config.database_path)?);
    let registry = Arc::new(PendingRegistry::new());

    let client = Arc::new(TelegramClient::new(
        &config.api_url,
        &config.bot_token,
        config.parse_mode.clone(),
        config.poll_timeout_secs,
    )?);
    relay::announce(&client).await?;

    let coordinator = Arc::new(Coordinator::new(
        storage.clone(),
        client.clone(),
        registry.clone(),
        config.broadcast.clone(),
    ));

    if let Some(admin) = &config.admin {
        let state = Arc::new(ApiState {
            directory: storage.clone(),
            registry: registry.clone(),
            token: admin.token.clone(),
        });
        let listener = tokio::net::TcpListener::bind(admin.bind).await?;
        tracing::info!("Operator API listening on {}", admin.bind);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, api::router(state)).await {
                tracing::error!("Operator API stopped: {e}");
            }
        });
    }

    let mut tasks = JoinSet::new();
    tokio::select! {
        _ = relay::run(client, coordinator, config.poll_timeout_secs, &mut tasks) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
        }
    }

    tracing::info!("Shutting down; waiting for {} in-flight updates", tasks.len());

    let aborted = relay::drain(&mut tasks, SHUTDOWN_GRACE).await;
    if aborted > 0 {
        tracing::warn!("Aborted {aborted} updates still running after {}s", SHUTDOWN_GRACE.as_secs());
    }
    tracing::info!("{} drafts abandoned", registry.len());

    Ok(())
}
