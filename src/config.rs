use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Placeholder values shipped in sample `.env` files; treated as "not configured".
const PRIMARY_KEY_PLACEHOLDER: &str = "your_primary_gemini_api_key_here";
const BACKUP_KEY_PLACEHOLDER: &str = "your_backup_gemini_api_key_here";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Inkread server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Primary upstream credential, when configured.
    pub primary_api_key: Option<String>,
    /// Backup upstream credential, when configured.
    pub backup_api_key: Option<String>,
    /// Base URL of the generative-content API.
    pub gemini_base_url: String,
    /// Model used for text extraction from images and scanned pages.
    pub ocr_model: String,
    /// Model used by the summarize transform.
    pub summarize_model: String,
    /// Model used by the translate transform.
    pub translate_model: String,
    /// Model used by the question-answering transform.
    pub qa_model: String,
    /// Probation window before the router retries the primary credential.
    pub failback_cooldown: Duration,
    /// Age after which a session is removed by the sweeper.
    pub session_ttl: Duration,
    /// Interval between background sweeps.
    pub session_sweep_interval: Duration,
    /// Upper bound on a single upstream extraction call.
    pub ocr_item_timeout: Duration,
    /// Maximum number of images (or PDF pages) accepted in one upload.
    pub max_images: usize,
    /// Maximum number of pages accepted for a single PDF.
    pub max_pdf_pages: usize,
    /// Maximum size of a single uploaded file, in megabytes.
    pub max_file_size_mb: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            primary_api_key: load_credential("GEMINI_API_KEY_1", PRIMARY_KEY_PLACEHOLDER),
            backup_api_key: load_credential("GEMINI_API_KEY_2", BACKUP_KEY_PLACEHOLDER),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ocr_model: load_model("MODEL_OCR"),
            summarize_model: load_model("MODEL_SUMMARIZE"),
            translate_model: load_model("MODEL_TRANSLATE"),
            qa_model: load_model("MODEL_QA"),
            failback_cooldown: Duration::from_secs(load_parsed("FAILBACK_COOLDOWN_SECS", 300)?),
            session_ttl: Duration::from_secs(load_parsed("SESSION_TTL_SECS", 3600)?),
            session_sweep_interval: Duration::from_secs(
                load_parsed("SESSION_SWEEP_INTERVAL_SECS", 300)?.max(1),
            ),
            ocr_item_timeout: Duration::from_secs(load_parsed("OCR_ITEM_TIMEOUT_SECS", 120)?),
            max_images: load_parsed("MAX_IMAGES", 5)?,
            max_pdf_pages: load_parsed("MAX_PDF_PAGES", 5)?,
            max_file_size_mb: load_parsed("MAX_FILE_SIZE_MB", 10)?,
            server_port: load_env_optional("SERVER_PORT")
                .or_else(|| load_env_optional("PORT"))
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Configuration with defaults and no credentials, useful for tests and embedding.
    pub fn with_defaults() -> Self {
        Self {
            primary_api_key: None,
            backup_api_key: None,
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            ocr_model: DEFAULT_MODEL.to_string(),
            summarize_model: DEFAULT_MODEL.to_string(),
            translate_model: DEFAULT_MODEL.to_string(),
            qa_model: DEFAULT_MODEL.to_string(),
            failback_cooldown: Duration::from_secs(300),
            session_ttl: Duration::from_secs(3600),
            session_sweep_interval: Duration::from_secs(300),
            ocr_item_timeout: Duration::from_secs(120),
            max_images: 5,
            max_pdf_pages: 5,
            max_file_size_mb: 10,
            server_port: None,
        }
    }

    /// Maximum size of a single uploaded file, in bytes.
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_credential(key: &str, placeholder: &str) -> Option<String> {
    load_env_optional(key)
        .map(|value| value.trim().to_string())
        .filter(|value| value != placeholder)
}

fn load_model(key: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

fn load_parsed<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        primary_configured = config.primary_api_key.is_some(),
        backup_configured = config.backup_api_key.is_some(),
        ocr_model = %config.ocr_model,
        server_port = ?config.server_port,
        session_ttl_secs = config.session_ttl.as_secs(),
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
