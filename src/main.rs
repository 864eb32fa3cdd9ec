// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Single binary hosting both service roles. `ROLE=provider` serves token
//! issuance, redemption, complaints, and epoch rotation; `ROLE=appserver`
//! serves the delivery handshake. See `config` for every knob.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use mulepay::appserver::{self, AppServer, AppServerConfig, SensorRegistry};
use mulepay::config;
use mulepay::credential::Keypair;
use mulepay::crypto::{load_signing_key, SymmetricKey};
use mulepay::dedup::{memory::MemoryDedupStore, redb::RedbDedupStore, DedupStore};
use mulepay::provider::{AppServerRegistry, Provider, ProviderLedgers};
use mulepay::transport::{HttpComplaintRelay, HttpProviderEndpoint};

#[tokio::main]
async fn main() {
    init_tracing();

    let role = env::var(config::ROLE_ENV).unwrap_or_else(|_| "provider".to_string());
    let cancel = CancellationToken::new();
    let app = match role.as_str() {
        "provider" => provider_app(),
        "appserver" => appserver_app(&cancel),
        other => panic!("unknown {}: {other:?} (expected provider or appserver)", config::ROLE_ENV),
    };

    serve(app, role, cancel).await;
}

fn init_tracing() {
    let format = env::var(config::LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn provider_app() -> Router {
    let delivery_keys = load_keypair(config::PROVIDER_DELIVERY_SEED_ENV);
    let complaint_keys = load_keypair(config::PROVIDER_COMPLAINT_SEED_ENV);
    let registry_path = required_path(config::APPSERVER_REGISTRY_ENV);
    let appservers =
        AppServerRegistry::load(&registry_path).expect("failed to load appserver registry");
    info!(appservers = appservers.len(), "loaded appserver registry");

    let ledgers = ProviderLedgers {
        tokens: dedup_store("tokens"),
        complaint_tokens: dedup_store("complaint_tokens"),
        complaint_duplicates: dedup_store("complaint_duplicates"),
    };

    let provider = Provider::new(
        delivery_keys,
        complaint_keys,
        appservers,
        ledgers,
        HttpComplaintRelay::new(),
    );
    mulepay::provider::api::router(Arc::new(provider)).layer(TraceLayer::new_for_http())
}

fn appserver_app(cancel: &CancellationToken) -> Router {
    let signing_key = load_signing_key(&required_path(config::APPSERVER_SIGNING_KEY_ENV))
        .expect("failed to load appserver signing key");
    let symmetric_key = SymmetricKey::load(&required_path(config::APPSERVER_AES_KEY_ENV))
        .expect("failed to load appserver AES key");
    let sensors = SensorRegistry::load(&required_path(config::SENSOR_REGISTRY_ENV))
        .expect("failed to load sensor registry");
    info!(sensors = sensors.len(), "loaded sensor registry");

    let provider_url = env::var(config::PROVIDER_URL_ENV)
        .unwrap_or_else(|_| panic!("{} must be set", config::PROVIDER_URL_ENV));

    let appserver_config = AppServerConfig {
        token_batch_size: env_parsed(
            config::TOKEN_BATCH_SIZE_ENV,
            config::DEFAULT_TOKEN_BATCH_SIZE,
        ),
        pending_ttl: Duration::from_secs(env_parsed(
            config::PENDING_TTL_SECS_ENV,
            config::DEFAULT_PENDING_TTL_SECS,
        )),
    };

    let appserver = Arc::new(AppServer::new(
        signing_key,
        symmetric_key,
        sensors,
        dedup_store("seen_hashes"),
        HttpProviderEndpoint::new(provider_url),
        appserver_config,
    ));
    appserver::spawn_eviction_task(Arc::clone(&appserver), cancel.child_token());

    appserver::api::router(appserver).layer(TraceLayer::new_for_http())
}

/// Pick the dedup backend for one ledger namespace. `redb` gives each
/// namespace its own database file under `DATA_DIR`.
fn dedup_store(namespace: &'static str) -> Arc<dyn DedupStore> {
    let backend = env::var(config::DEDUP_BACKEND_ENV).unwrap_or_else(|_| "memory".to_string());
    match backend.as_str() {
        "memory" => Arc::new(MemoryDedupStore::new()),
        "redb" => {
            let data_dir = PathBuf::from(
                env::var(config::DATA_DIR_ENV)
                    .unwrap_or_else(|_| config::DEFAULT_DATA_DIR.to_string()),
            );
            let path = data_dir.join(format!("{namespace}.redb"));
            Arc::new(
                RedbDedupStore::open(&path, namespace)
                    .unwrap_or_else(|e| panic!("failed to open ledger {}: {e}", path.display())),
            )
        }
        other => panic!(
            "unknown {}: {other:?} (expected memory or redb)",
            config::DEDUP_BACKEND_ENV
        ),
    }
}

fn load_keypair(var: &str) -> Keypair {
    let path = required_path(var);
    let seed = std::fs::read(&path)
        .unwrap_or_else(|e| panic!("failed to read OPRF seed {}: {e}", path.display()));
    Keypair::from_bytes(&seed)
        .unwrap_or_else(|e| panic!("invalid OPRF seed {}: {e}", path.display()))
}

fn required_path(var: &str) -> PathBuf {
    PathBuf::from(env::var(var).unwrap_or_else(|_| panic!("{var} must be set")))
}

fn env_parsed<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

async fn serve(app: Router, role: String, cancel: CancellationToken) {
    let host = env::var(config::HOST_ENV).unwrap_or_else(|_| config::DEFAULT_HOST.to_string());
    let port: u16 = env_parsed(config::PORT_ENV, config::DEFAULT_PORT);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));
    info!(%addr, role = %role, "mulepay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(cancel))
        .await
        .expect("server failed");
}

async fn shutdown(cancel: CancellationToken) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install shutdown handler");
    info!("shutdown signal received");
    cancel.cancel();
}
