use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_PORT: u16 = 7700;
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";
const DEFAULT_EMBEDDING_FALLBACKS: &str = "models/gemini-embedding-001";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the tutor service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on and reports from `GET /`.
    pub server_port: u16,
    /// Enables debug-level logging.
    pub debug: bool,
    /// Host of the Redis instance backing the task queue.
    pub redis_host: String,
    /// Port of the Redis instance.
    pub redis_port: u16,
    /// Logical Redis database index.
    pub redis_db: i64,
    /// Optional Redis password.
    pub redis_password: Option<String>,
    /// Name of the Redis list used as the task queue.
    pub queue_name: String,
    /// API key for the hosted Gemini models.
    pub google_api_key: String,
    /// Base URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Embedding backend used to vectorize chunks.
    pub embedding_provider: EmbeddingProvider,
    /// Preferred embedding model identifier.
    pub embedding_model: String,
    /// Ordered embedding models tried when the preferred one fails.
    pub embedding_fallback_models: Vec<String>,
    /// Vector size produced by the deterministic hash provider.
    pub embedding_dimension: usize,
    /// Generation model used for tutor answers and chat.
    pub generation_model: String,
    /// Sampling temperature for tutor answers.
    pub generation_temperature: f32,
    /// Maximum chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Character overlap carried between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks retrieved per query.
    pub retrieval_top_k: usize,
    /// File holding the persisted similarity index.
    pub vector_index_path: PathBuf,
    /// Maximum accepted request body size for uploads.
    pub upload_limit_bytes: usize,
}

/// Supported embedding backends for the retrieval pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Gemini embeddings API.
    Gemini,
    /// Deterministic offline hashing embeddings.
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_optional("PORT")?.unwrap_or(DEFAULT_PORT),
            debug: load_env_optional("DEBUG")
                .map(|value| matches!(value.as_str(), "1" | "true" | "True"))
                .unwrap_or(false),
            redis_host: load_env_optional("REDIS_HOST").unwrap_or_else(|| "localhost".into()),
            redis_port: parse_optional("REDIS_PORT")?.unwrap_or(6379),
            redis_db: parse_optional("REDIS_DB")?.unwrap_or(0),
            redis_password: load_env_optional("REDIS_PASSWORD"),
            queue_name: load_env_optional("QUEUE_NAME").unwrap_or_else(|| "task_queue".into()),
            google_api_key: load_env("GOOGLE_API_KEY")?,
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
            embedding_provider: match load_env_optional("EMBEDDING_PROVIDER") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
                None => EmbeddingProvider::Gemini,
            },
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            embedding_fallback_models: parse_list(
                &load_env_optional("EMBEDDING_FALLBACK_MODELS")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_FALLBACKS.into()),
            ),
            embedding_dimension: positive(
                "EMBEDDING_DIMENSION",
                parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(768),
            )?,
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.into()),
            generation_temperature: parse_optional("GENERATION_TEMPERATURE")?.unwrap_or(0.9),
            text_splitter_chunk_size: positive(
                "TEXT_SPLITTER_CHUNK_SIZE",
                parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(1000),
            )?,
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(0),
            retrieval_top_k: positive(
                "RETRIEVAL_TOP_K",
                parse_optional("RETRIEVAL_TOP_K")?.unwrap_or(5),
            )?,
            vector_index_path: load_env_optional("VECTOR_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("vector_index.json")),
            upload_limit_bytes: parse_optional("UPLOAD_LIMIT_BYTES")?
                .unwrap_or(DEFAULT_UPLOAD_LIMIT_BYTES),
        })
    }

    /// Connection URL for the Redis instance, without credentials.
    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.redis_host, self.redis_port, self.redis_db
        )
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn positive(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(value)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
