pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod identity;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{Settings, StoreBackend};
use crate::core::{redis::RedisHandle, state::AppState, telemetry};
use crate::identity::{memory::MemoryIdentityStore, postgres::PgIdentityStore, IdentityStore};
use crate::services::schedule_analysis::OpenAiScheduleAnalyzer;
use crate::store::{memory::MemoryDocumentStore, postgres::PgDocumentStore, DocumentStore};

type Backends = (Arc<dyn DocumentStore>, Arc<dyn IdentityStore>);

async fn init_backends(settings: &Settings) -> anyhow::Result<Backends> {
    match settings.store().backend {
        StoreBackend::Postgres => {
            let pool = db::init_pool(settings).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Using PostgreSQL document and identity stores");
            Ok((
                Arc::new(PgDocumentStore::new(pool.clone())),
                Arc::new(PgIdentityStore::new(pool)),
            ))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on shutdown");
            Ok((Arc::new(MemoryDocumentStore::new()), Arc::new(MemoryIdentityStore::new())))
        }
    }
}

async fn connect_redis(settings: &Settings) -> RedisHandle {
    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without rate limits");
    } else {
        tracing::info!("Redis connected successfully");
    }
    redis
}

async fn init_state(settings: Settings) -> anyhow::Result<AppState> {
    let (store, identity) = init_backends(&settings).await?;
    let redis = connect_redis(&settings).await;
    let analyzer = Arc::new(OpenAiScheduleAnalyzer::from_settings(&settings)?);
    Ok(AppState::new(settings, store, identity, redis, analyzer))
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = init_state(settings).await?;

    if let Err(err) = core::bootstrap::ensure_first_admin(&state).await {
        tracing::error!(error = %err, "Failed to ensure first admin");
    }
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Accountable API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = init_state(settings).await?;

    let result = tasks::scheduler::run(state.clone()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
