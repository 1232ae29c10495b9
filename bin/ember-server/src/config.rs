//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for ember-server.
///
/// Every field except the Gemini API key has a default, so a local server
/// only needs `GEMINI_API_KEY` set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://ember.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, log records are also written to a daily-rolling file here.
    pub log_dir: Option<String>,

    /// Comma-separated list of allowed CORS origins. `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Number of recent messages handed to the backend as context.
    pub context_window: usize,

    /// Resolve placeholders left pending by a previous process at startup.
    pub recover_pending: bool,

    /// How long shutdown waits for in-flight fulfillments (default: 10 s).
    pub drain_timeout: std::time::Duration,

    /// Gemini backend settings.
    pub gemini: GeminiConfig,
}

/// Settings for the Gemini REST backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key; startup fails without it.
    pub api_key: Option<String>,
    /// Base URL of the `v1beta` REST surface.
    pub base_url: String,
    /// Model used for text replies.
    pub text_model: String,
    /// Model used for image generation.
    pub image_model: String,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("EMBER_BIND", "0.0.0.0:3000"),
            database_url: env_or("EMBER_DATABASE_URL", "sqlite://ember.db?mode=rwc"),
            log_level: env_or("EMBER_LOG", "info"),
            log_json: parse_flag("EMBER_LOG_JSON", false),
            log_dir: env_opt("EMBER_LOG_DIR"),
            cors_allowed_origins: env_opt("EMBER_CORS_ORIGINS"),
            context_window: parse_env("EMBER_CONTEXT_WINDOW", 10),
            recover_pending: parse_flag("EMBER_RECOVER_PENDING", true),
            drain_timeout: std::time::Duration::from_secs(parse_env("EMBER_DRAIN_SECS", 10)),
            gemini: GeminiConfig {
                api_key: env_opt("GEMINI_API_KEY"),
                base_url: env_or(
                    "EMBER_GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
                text_model: env_or("EMBER_TEXT_MODEL", "gemini-2.5-flash"),
                image_model: env_or(
                    "EMBER_IMAGE_MODEL",
                    "gemini-2.0-flash-preview-image-generation",
                ),
            },
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
