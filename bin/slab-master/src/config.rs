//! Master configuration, loaded from environment variables at startup.

/// Runtime configuration for slab-master.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the public + internal HTTP API binds to.
    pub bind_address: String,

    /// Sqlite connection string for sessions, messages, documents, images,
    /// meetings, vectors, and the request log.
    pub database_url: String,

    /// KV store connection string, shared with the Worker (GPU state,
    /// progress records, session cache, stream buffers, control flags).
    pub redis_url: String,

    /// Chat model name passed to the LLM client.
    pub llm_model: String,

    /// Directory documents are fetched from for `GET
    /// /document/internal/file/{name}` and written to by `POST
    /// /document/upload`.
    pub document_storage_dir: String,

    /// Directory meeting recordings are fetched from and written to,
    /// mirroring `document_storage_dir`.
    pub meeting_storage_dir: String,

    /// Directory generated images are written to by `POST
    /// /image/internal/upload`.
    pub image_storage_dir: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Whether to mount the Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// Comma-separated list of allowed CORS origins. `None` or empty means
    /// wildcard (`Any`).
    pub cors_allowed_origins: Option<String>,

    /// Bearer token required on `/admin/*` routes. `None` disables the
    /// check (local development only).
    pub admin_api_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("SLAB_BIND", "0.0.0.0:3000"),
            database_url: env_or("SLAB_DATABASE_URL", "sqlite://slab-master.db?mode=rwc"),
            redis_url: env_or("SLAB_REDIS_URL", "redis://127.0.0.1:6379"),
            llm_model: env_or("SLAB_LLM_MODEL", "gpt-4o-mini"),
            document_storage_dir: env_or("SLAB_DOCUMENT_DIR", "/tmp/slab-master/documents"),
            meeting_storage_dir: env_or("SLAB_MEETING_DIR", "/tmp/slab-master/meetings"),
            image_storage_dir: env_or("SLAB_IMAGE_DIR", "/tmp/slab-master/images"),
            log_level: env_or("SLAB_LOG", "info"),
            log_json: std::env::var("SLAB_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            enable_swagger: std::env::var("SLAB_ENABLE_SWAGGER")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            cors_allowed_origins: std::env::var("SLAB_CORS_ORIGINS").ok(),
            admin_api_token: std::env::var("SLAB_ADMIN_TOKEN").ok(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
