mod config;
mod db;
mod errors;
mod identity;
mod llm_client;
mod models;
mod rewrite;
mod routes;
mod state;
mod storage;
mod store;
mod summary;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{CloudBackendKind, Config};
use crate::db::{create_pool, ensure_schema};
use crate::identity::{AllowListPolicy, IdentityPolicy};
use crate::llm_client::{LlmClient, TextGenerator};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::cloud::memory::InMemoryCloud;
use crate::storage::cloud::postgres::PgCloudStore;
use crate::storage::cloud::CloudMedium;
use crate::store::sessions::SessionRegistry;
use crate::store::StoreDeps;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ImpactLog API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the cloud medium used by the privileged account
    let cloud = build_cloud_medium(&config).await?;

    let policy: Arc<dyn IdentityPolicy> =
        Arc::new(AllowListPolicy::new(config.privileged_email.clone()));

    // Initialize LLM client (optional; rewrite is disabled without a key)
    let llm: Option<Arc<dyn TextGenerator>> = match &config.gemini_api_key {
        Some(key) => {
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Some(Arc::new(LlmClient::new(key.clone())))
        }
        None => {
            warn!("GEMINI_API_KEY not set; AI rewrite is disabled");
            None
        }
    };

    info!(
        "Local store at {}, snapshot timeout {}ms",
        config.local_store_dir.display(),
        config.snapshot_timeout.as_millis()
    );
    let sessions = Arc::new(SessionRegistry::new(StoreDeps {
        policy: policy.clone(),
        cloud,
        local_root: config.local_store_dir.clone(),
        snapshot_timeout: config.snapshot_timeout,
    }));

    // Close sessions nobody has used for a while
    let sweep_every = (config.session_idle_timeout / 4).max(Duration::from_secs(1));
    sessions
        .clone()
        .spawn_sweeper(config.session_idle_timeout, sweep_every);
    info!(
        "Idle sessions close after {}s",
        config.session_idle_timeout.as_secs()
    );

    // Build app state
    let state = AppState {
        sessions,
        policy,
        llm,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connects the configured cloud medium: PostgreSQL with LISTEN/NOTIFY, or an
/// in-process store for development.
async fn build_cloud_medium(config: &Config) -> Result<Arc<dyn CloudMedium>> {
    match config.cloud_backend {
        CloudBackendKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres cloud backend")?;
            let pool = create_pool(url).await?;
            ensure_schema(&pool).await?;
            Ok(Arc::new(PgCloudStore::connect(pool).await?))
        }
        CloudBackendKind::Memory => {
            warn!("Using the in-memory cloud backend; privileged data is lost on restart");
            Ok(Arc::new(InMemoryCloud::new()))
        }
    }
}
