/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod health;
mod poller;
mod telegram;

use gramlink_core::gateway::ChatGateway;
use gramlink_core::state::RelayState;
use gramlink_core::store::ConnectionStore;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramApi;
use tracing::{error, info};

struct BotConfig {
    token: String,
    owner_id: i64,
    db_path: String,
    bind: SocketAddr,
    http_timeout_secs: u64,
    poll_timeout_secs: u64,
}

fn load_config() -> BotConfig {
    let token = std::env::var("GRAMLINK_TOKEN").expect("GRAMLINK_TOKEN is required");
    let owner_id = std::env::var("GRAMLINK_OWNER_ID")
        .expect("GRAMLINK_OWNER_ID is required")
        .parse()
        .expect("GRAMLINK_OWNER_ID invalid");
    let db_path = std::env::var("GRAMLINK_DB").unwrap_or_else(|_| "gramlink.db".to_string());
    let bind: SocketAddr = std::env::var("GRAMLINK_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()
        .expect("GRAMLINK_BIND invalid");
    let http_timeout_secs = std::env::var("GRAMLINK_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    let poll_timeout_secs = std::env::var("GRAMLINK_POLL_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);
    BotConfig {
        token,
        owner_id,
        db_path,
        bind,
        http_timeout_secs,
        poll_timeout_secs,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let cfg = load_config();
    let store = ConnectionStore::open(&cfg.db_path).expect("store init");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("http client init");
    let api = Arc::new(TelegramApi::new(http, &cfg.token, cfg.poll_timeout_secs));

    let identity = api.self_identity().await.expect("getMe failed");
    info!("authorized as @{} ({})", identity.username, identity.id);
    info!("owner id: {}", cfg.owner_id);

    let gateway: Arc<dyn ChatGateway> = api.clone();
    let state = Arc::new(RelayState::new(cfg.owner_id, identity, gateway, store));

    let ready = Arc::new(AtomicBool::new(false));
    let health_ready = ready.clone();
    let bind = cfg.bind;
    tokio::spawn(async move {
        if let Err(e) = health::serve(bind, health_ready).await {
            error!("health endpoint failed: {e:#}");
        }
    });

    if let Err(e) = poller::run(&api, &state, &ready).await {
        error!("poller exited with error: {e:#}");
    }
    info!("gramlink_bot stopped");
}
