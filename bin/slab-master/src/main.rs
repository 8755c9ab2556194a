//! slab-master – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Connect to the shared KV store (the only cross-process synchronizer).
//! 5. Build the task broker, GPU arbiter, progress reporter, session cache,
//!    retrieval index, and LLM client.
//! 6. Spawn the `Q_DEFAULT` consumer(s) and the GPU release-sweep scheduler.
//! 7. Build the Axum router and start the HTTP server with graceful shutdown.

mod beat;
mod config;
mod db;
mod error;
mod middleware;
mod retrieval;
mod routes;
mod state;

use std::sync::Arc;

use slab_broker::TaskBroker;
use slab_gpu::{GpuArbiter, NoopHousekeeping};
use slab_kv::KvStore;
use slab_llm::{GenaiLlmClient, LlmClient, ZeroEmbedder};
use slab_orchestrator::ChatOrchestrator;
use slab_progress::ProgressReporter;
use slab_session::SessionCache;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::SqliteStore;
use crate::retrieval::SqliteRetrievalIndex;
use crate::state::AppState;

const EMBED_DIMS: usize = 384;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env();

    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: SLAB_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).with_thread_ids(true);
    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "slab-master starting");

    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "database ready");

    let kv: Arc<dyn KvStore> = Arc::new(slab_kv::RedisStore::connect(&cfg.redis_url).await?);
    info!(redis_url = %cfg.redis_url, "kv store connected");

    let broker = TaskBroker::new(kv.clone());
    let progress = ProgressReporter::new(kv.clone());

    // Master only reads/reports GPU state via `/admin/gpu`; it never drives
    // model load/unload directly, so housekeeping is a no-op here (the
    // Worker binds the real adapter to its own arbiter instance).
    let arbiter = Arc::new(GpuArbiter::new(kv.clone(), broker.clone(), Arc::new(NoopHousekeeping)));

    let session_cache = Arc::new(SessionCache::new(kv.clone(), store.clone(), broker.clone()));

    let embedder = Arc::new(ZeroEmbedder::new(EMBED_DIMS));
    let retrieval_index = Arc::new(SqliteRetrievalIndex::new(store.clone(), embedder));

    let llm: Arc<dyn LlmClient> = Arc::new(GenaiLlmClient::new(cfg.llm_model.clone()));

    let orchestrator = Arc::new(ChatOrchestrator::new(kv.clone(), broker.clone(), retrieval_index, llm.clone()));

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store,
        kv,
        broker,
        arbiter,
        progress,
        session_cache,
        orchestrator,
        llm,
    });

    let mut handles = Vec::new();
    handles.push(tokio::spawn(beat::consume_default_queue(0, state.clone())));
    handles.push(tokio::spawn(beat::release_sweep_scheduler(state.clone())));

    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&state.config.bind_address).await?;
    info!(addr = %state.config.bind_address, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("slab-master stopping");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
