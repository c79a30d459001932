use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_INDEX_NAME: &str = "pdf-rag-index";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

/// Configuration for the OpenAI-compatible model API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub temperature: f32,
    /// Requested embedding size, kept equal to the index dimension
    pub dimensions: usize,
    pub timeout: Duration,
}

/// Which vector store backs the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Qdrant,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(StoreBackend::Qdrant),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!(
                "Unknown VECTOR_STORE '{}'. Expected 'qdrant' or 'memory'.",
                other
            )),
        }
    }
}

/// Configuration for the vector index
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub api_key: Option<String>,
    pub index_name: String,
    pub namespace: Option<String>,
    pub dimension: usize,
    pub ready_max_attempts: u32,
    pub ready_interval: Duration,
}

/// HTTP surface settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

/// Full application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub index: IndexConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").context("OPENAI_API_KEY is not configured.")?;
        let backend: StoreBackend = parse_or(&get, "VECTOR_STORE", StoreBackend::Qdrant)?;

        let qdrant_api_key = get("QDRANT_API_KEY");
        if backend == StoreBackend::Qdrant && qdrant_api_key.is_none() {
            return Err(anyhow!("QDRANT_API_KEY is not configured."));
        }

        let dimension = parse_or(&get, "VECTOR_DIMENSION", 1536usize)?;

        let ready_max_attempts = parse_or(&get, "INDEX_READY_MAX_ATTEMPTS", 60u32)?;
        if ready_max_attempts == 0 {
            return Err(anyhow!("INDEX_READY_MAX_ATTEMPTS must be at least 1."));
        }

        let openai = OpenAiConfig {
            api_key,
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            chat_model: get("OPENAI_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embed_model: get("OPENAI_EMBED_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            temperature: parse_or(&get, "OPENAI_TEMPERATURE", 0.2f32)?,
            dimensions: dimension,
            timeout: Duration::from_secs(parse_or(&get, "OPENAI_TIMEOUT_SECS", 120u64)?),
        };

        let index = IndexConfig {
            backend,
            url: get("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            api_key: qdrant_api_key,
            index_name: get("VECTOR_INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            namespace: get("VECTOR_NAMESPACE"),
            dimension,
            ready_max_attempts,
            ready_interval: Duration::from_millis(parse_or(&get, "INDEX_READY_INTERVAL_MS", 1000u64)?),
        };

        let cors_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let http = HttpConfig {
            cors_origins,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 50 * 1024 * 1024usize)?,
        };

        Ok(Config { openai, index, http })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: '{}' ({})", key, raw, e)),
        None => Ok(default),
    }
}
