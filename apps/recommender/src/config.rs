use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Which hosted embedding API the indexer and retriever talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Qdrant,
}

impl FromStr for EmbeddingProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "qdrant" => Ok(Self::Qdrant),
            other => anyhow::bail!("unknown EMBEDDING_PROVIDER '{other}' (expected openai|qdrant)"),
        }
    }
}

impl EmbeddingProvider {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "text-embedding-3-small",
            Self::Qdrant => "qdrant/all-MiniLM-L6-v2",
        }
    }
}

/// Where the vector index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Qdrant,
    Local,
}

impl FromStr for VectorBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "local" => Ok(Self::Local),
            other => anyhow::bail!("unknown VECTOR_BACKEND '{other}' (expected qdrant|local)"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// Everything has a default except credentials, which are checked by the
/// subcommand that needs them (`crawl` runs without any API key).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,

    // LLM (OpenAI-compatible chat completions; Groq by default)
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,

    // Embeddings
    pub embedding_provider: EmbeddingProvider,
    pub embedding_api_key: Option<String>,
    /// Overrides the provider's default endpoint.
    pub embedding_base_url: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: Option<usize>,
    pub embedding_timeout: Duration,
    pub embed_batch_size: usize,
    pub embed_max_attempts: u32,
    pub embed_backoff_ms: u64,

    // Vector index
    pub vector_backend: VectorBackend,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
    pub local_index_path: PathBuf,
    pub vector_timeout: Duration,

    // Catalog + crawler
    pub catalog_path: PathBuf,
    pub cursor_path: PathBuf,
    pub catalog_start_url: String,
    pub crawl_page_size: u32,
    pub crawl_max_pages: u32,
    pub crawl_max_consecutive_failures: u32,
    pub fetch_timeout: Duration,

    // Recommendation
    pub candidate_pool: usize,
    pub result_limit: usize,
    pub min_results: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let embedding_provider = parse_env("EMBEDDING_PROVIDER", EmbeddingProvider::OpenAi)?;

        Ok(Config {
            port: parse_env("PORT", 8000)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            llm_api_key: optional_env("LLM_API_KEY").or_else(|| optional_env("GROQ_API_KEY")),
            llm_base_url: string_env("LLM_BASE_URL", "https://api.groq.com/openai/v1"),
            llm_model: string_env("LLM_MODEL", "llama-3.1-8b-instant"),
            llm_timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 60)?),

            embedding_provider,
            embedding_api_key: optional_env("EMBEDDING_API_KEY")
                .or_else(|| optional_env("OPENAI_API_KEY")),
            embedding_base_url: optional_env("EMBEDDING_BASE_URL"),
            embedding_model: string_env("EMBEDDING_MODEL", embedding_provider.default_model()),
            embedding_dimensions: optional_env("EMBEDDING_DIMENSIONS")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("EMBEDDING_DIMENSIONS must be a positive integer")?,
            embedding_timeout: Duration::from_secs(parse_env("EMBEDDING_TIMEOUT_SECS", 30)?),
            embed_batch_size: parse_env::<usize>("EMBED_BATCH_SIZE", 32)?.max(1),
            embed_max_attempts: parse_env::<u32>("EMBED_MAX_ATTEMPTS", 3)?.max(1),
            embed_backoff_ms: parse_env("EMBED_BACKOFF_MS", 500)?,

            vector_backend: parse_env("VECTOR_BACKEND", VectorBackend::Qdrant)?,
            qdrant_url: string_env("QDRANT_URL", "http://localhost:6333"),
            qdrant_api_key: optional_env("QDRANT_API_KEY"),
            collection_name: string_env("QDRANT_COLLECTION", "shl_assessments"),
            local_index_path: PathBuf::from(string_env("LOCAL_INDEX_PATH", "vector_index.json")),
            vector_timeout: Duration::from_secs(parse_env("VECTOR_TIMEOUT_SECS", 60)?),

            catalog_path: PathBuf::from(string_env("CATALOG_PATH", "shl_assessments.json")),
            cursor_path: PathBuf::from(string_env("CRAWL_CURSOR_PATH", "crawl_cursor.json")),
            catalog_start_url: string_env(
                "CATALOG_START_URL",
                "https://www.shl.com/solutions/products/product-catalog/",
            ),
            crawl_page_size: parse_env::<u32>("CRAWL_PAGE_SIZE", 12)?.max(1),
            crawl_max_pages: parse_env("CRAWL_MAX_PAGES", 100)?,
            crawl_max_consecutive_failures: parse_env::<u32>("CRAWL_MAX_CONSECUTIVE_FAILURES", 3)?
                .max(1),
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SECS", 30)?),

            candidate_pool: parse_env("CANDIDATE_POOL", 20)?,
            result_limit: parse_env("RESULT_LIMIT", 5)?,
            min_results: parse_env("MIN_RESULTS", 5)?,
        })
    }

    /// Embedding endpoint: the override if set, else the provider's default.
    pub fn embedding_endpoint(&self) -> String {
        match (&self.embedding_base_url, self.embedding_provider) {
            (Some(url), _) => url.clone(),
            (None, EmbeddingProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
            (None, EmbeddingProvider::Qdrant) => {
                format!("{}/inference/text", self.qdrant_url.trim_end_matches('/'))
            }
        }
    }

    pub fn require_llm_api_key(&self) -> Result<&str> {
        self.llm_api_key
            .as_deref()
            .context("Required environment variable 'LLM_API_KEY' (or 'GROQ_API_KEY') is not set")
    }

    pub fn require_embedding_api_key(&self) -> Result<&str> {
        match self.embedding_provider {
            EmbeddingProvider::OpenAi => self.embedding_api_key.as_deref().context(
                "Required environment variable 'EMBEDDING_API_KEY' (or 'OPENAI_API_KEY') is not set",
            ),
            // Qdrant Cloud Inference authenticates with the cluster key.
            EmbeddingProvider::Qdrant => self
                .embedding_api_key
                .as_deref()
                .or(self.qdrant_api_key.as_deref())
                .context("Required environment variable 'QDRANT_API_KEY' is not set"),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn string_env(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}
