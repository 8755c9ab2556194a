use crate::config::Config;
use crate::db::SqliteStore;
use slab_broker::TaskBroker;
use slab_gpu::GpuArbiter;
use slab_kv::KvStore;
use slab_llm::LlmClient;
use slab_orchestrator::ChatOrchestrator;
use slab_progress::ProgressReporter;
use slab_session::SessionCache;
use std::sync::Arc;

/// Shared state handed to every route. No analogue of the teacher's
/// `TaskManager` (abort-handle tracking for cancellable background tasks) is
/// carried here — Master has no long-running per-request tokio task that
/// needs cancelling; chat cancellation runs entirely through the KV control
/// flag (`slab_stream::request_stop`), not task abort.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub kv: Arc<dyn KvStore>,
    pub broker: TaskBroker,
    pub arbiter: Arc<GpuArbiter>,
    pub progress: ProgressReporter,
    pub session_cache: Arc<SessionCache>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub llm: Arc<dyn LlmClient>,
}
