//! slab-worker – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Connect to the shared KV store (the only cross-process synchronizer).
//! 4. Build the GPU arbiter, progress reporter, and Master HTTP client.
//! 5. Spawn one consumer per queue: `Q_IMAGE`, `Q_STT`, and N `Q_DEFAULT`
//!    consumers that dispatch by task name, re-enqueueing tasks meant for
//!    the Master's own `Q_DEFAULT` consumer.

mod config;
mod model_host;

use slab_broker::TaskBroker;
use slab_gpu::GpuArbiter;
use slab_kv::KvStore;
use slab_pipelines::{harness, IngestRunner, SttRunner};
use slab_pipelines::image::ImageRunner;
use slab_pipelines::master_client::MasterClient;
use slab_progress::ProgressReporter;
use slab_types::config::{task_name, Q_DEFAULT, Q_IMAGE, Q_STT};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::model_host::{ModelHost, RemoteModelHousekeeping};

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

    info!(version = env!("CARGO_PKG_VERSION"), "slab-worker starting");

    let kv: Arc<dyn KvStore> = Arc::new(slab_kv::RedisStore::connect(&cfg.redis_url).await?);
    info!(redis_url = %cfg.redis_url, "kv store connected");

    let broker = TaskBroker::new(kv.clone());
    let progress = ProgressReporter::new(kv.clone());
    let master = MasterClient::new(&cfg.master_base_url);

    let housekeeping = Arc::new(RemoteModelHousekeeping::new(&cfg.model_host_base_url));
    let arbiter = Arc::new(GpuArbiter::new(kv.clone(), broker.clone(), housekeeping));

    let image_runner: Arc<dyn harness::PipelineRunner> = Arc::new(ImageRunner::new(
        master.clone(),
        Box::new(ModelHost::new(&cfg.model_host_base_url)),
    ));
    let stt_runner: Arc<dyn harness::PipelineRunner> = Arc::new(SttRunner::new(
        master.clone(),
        Box::new(ModelHost::new(&cfg.model_host_base_url)),
    ));
    let ingest_runner: Arc<dyn harness::PipelineRunner> = Arc::new(IngestRunner::new(
        master.clone(),
        Arc::new(slab_llm::LineChunkParser),
        Arc::new(slab_llm::ZeroEmbedder::new(384)),
    ));

    let mut handles = Vec::new();

    handles.push(tokio::spawn(consume_queue(Q_IMAGE, broker.clone(), progress.clone(), Some(arbiter.clone()), image_runner)));
    handles.push(tokio::spawn(consume_queue(Q_STT, broker.clone(), progress.clone(), Some(arbiter.clone()), stt_runner)));

    for worker_id in 0..cfg.default_queue_consumers.max(1) {
        handles.push(tokio::spawn(consume_default_queue(
            worker_id,
            broker.clone(),
            progress.clone(),
            arbiter.clone(),
            ingest_runner.clone(),
        )));
    }

    info!("slab-worker ready");
    let _ = shutdown_signal().await;
    info!("slab-worker stopping");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

/// Drain loop for a single-purpose queue (`Q_IMAGE`, `Q_STT`): every
/// envelope it receives belongs to `runner`.
async fn consume_queue(
    queue: &'static str,
    broker: TaskBroker,
    progress: ProgressReporter,
    arbiter: Option<Arc<GpuArbiter>>,
    runner: Arc<dyn harness::PipelineRunner>,
) {
    loop {
        match broker.receive(queue, Duration::from_secs(1)).await {
            Ok(Some(envelope)) => {
                harness::run_task(runner.as_ref(), envelope, &progress, &broker, arbiter.as_ref()).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(queue, error = %e, "failed to receive from queue; backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// `Q_DEFAULT` carries tasks owned by either process (spec §6 "Task
/// queues"). This consumer claims `ingest` and `release-gpu-if-idle`
/// (`task_name::is_worker_default_task`) and re-pushes anything else so the
/// Master's own `Q_DEFAULT` consumer eventually claims it.
async fn consume_default_queue(
    worker_id: usize,
    broker: TaskBroker,
    progress: ProgressReporter,
    arbiter: Arc<GpuArbiter>,
    ingest_runner: Arc<dyn harness::PipelineRunner>,
) {
    loop {
        match broker.receive(Q_DEFAULT, Duration::from_secs(1)).await {
            Ok(Some(envelope)) if envelope.name == task_name::INGEST => {
                harness::run_task(ingest_runner.as_ref(), envelope, &progress, &broker, None).await;
            }
            Ok(Some(envelope)) if envelope.name == task_name::RELEASE_GPU_IF_IDLE => {
                if let Err(e) = arbiter.release_if_idle().await {
                    warn!(worker_id, error = %e, "release_if_idle failed");
                }
            }
            Ok(Some(envelope)) => {
                if let Err(e) = broker.resubmit(envelope).await {
                    warn!(worker_id, error = %e, "failed to re-push foreign Q_DEFAULT task");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(worker_id, error = %e, "failed to receive from Q_DEFAULT; backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
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
