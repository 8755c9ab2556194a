//! Worker configuration, loaded from environment variables at startup.

/// Runtime configuration for slab-worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// KV store connection string (default: `"redis://127.0.0.1:6379"`).
    pub redis_url: String,

    /// Base URL of the Master's internal HTTP API, used for file fetch,
    /// vector storage, image upload, meeting completion, and LLM completion
    /// (spec §6 "HTTP (internal, Master↔Worker)").
    pub master_base_url: String,

    /// Base URL of the external image/STT model-hosting service. Both are
    /// out-of-scope model backends (spec §1); this worker only talks HTTP to
    /// whatever actually hosts them.
    pub model_host_base_url: String,

    /// Number of concurrent `Q_DEFAULT` consumer loops (spec §5 "configurable
    /// for Q_DEFAULT").
    pub default_queue_consumers: usize,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("SLAB_REDIS_URL", "redis://127.0.0.1:6379"),
            master_base_url: env_or("SLAB_MASTER_URL", "http://127.0.0.1:3000"),
            model_host_base_url: env_or("SLAB_MODEL_HOST_URL", "http://127.0.0.1:9000"),
            default_queue_consumers: parse_env("SLAB_DEFAULT_QUEUE_CONSUMERS", 2),
            log_level: env_or("SLAB_LOG", "info"),
            log_json: std::env::var("SLAB_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
