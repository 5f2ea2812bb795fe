use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionsConfig {
    pub user_data: String,
    pub knowledge_base: String,
    pub orders: String,
    pub semantic_cache: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            user_data: "user_data".to_string(),
            knowledge_base: "knowledge_base".to_string(),
            orders: "orders".to_string(),
            semantic_cache: "semantic_cache".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dense_model: String,
    pub sparse_tokenizer: String,
    /// CLIP checkpoint for product photos
    pub image_model: String,
    /// Hub revision carrying the safetensors weights
    pub image_revision: String,
    /// Size of the product-image vector on the orders collection
    pub image_dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dense_model: "BAAI/bge-small-en-v1.5".to_string(),
            sparse_tokenizer: "prithivida/Splade_PP_en_v1".to_string(),
            image_model: "openai/clip-vit-base-patch32".to_string(),
            image_revision: "refs/pr/15".to_string(),
            image_dim: 512,
        }
    }
}

/// Which text-generation backend serves the tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Locally hosted quantized model behind Ollama
    Ollama,
    /// Cloud-hosted Gemini model
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GeneratorBackend,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key (cloud backends only)
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Ollama,
            model: "qwen2.5:7b-instruct".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k_prefetch: usize,
    pub top_k: usize,
    pub rrf_k: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_prefetch: 10,
            top_k: 3,
            rrf_k: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum Euclidean distance that still counts as a hit (inclusive)
    pub threshold: f32,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub max_attempts: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub embed_ms: u64,
    pub store_ms: u64,
    pub generate_ms: u64,
    pub turn_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embed_ms: 10_000,
            store_ms: 5_000,
            generate_ms: 60_000,
            turn_ms: 300_000,
        }
    }
}

impl TimeoutConfig {
    pub fn embed(&self) -> Duration {
        Duration::from_millis(self.embed_ms)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn generate(&self) -> Duration {
        Duration::from_millis(self.generate_ms)
    }

    pub fn turn(&self) -> Duration {
        Duration::from_millis(self.turn_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Messages kept per session; oldest dropped first
    pub max_turns: usize,
    /// Idle seconds before a session is evicted
    pub ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            ttl_secs: 3600,
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults when it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".deskpilot").join("config.toml"))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 || self.retrieval.k_prefetch == 0 {
            anyhow::bail!("retrieval.top_k and retrieval.k_prefetch must be positive");
        }
        if self.retrieval.rrf_k < 0.0 {
            anyhow::bail!("retrieval.rrf_k must not be negative");
        }
        if self.cache.threshold < 0.0 {
            anyhow::bail!("cache.threshold is a distance and must not be negative");
        }
        if self.embedding.image_dim == 0 {
            anyhow::bail!("embedding.image_dim must be positive");
        }
        if self.feedback.max_attempts == 0 {
            anyhow::bail!("feedback.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// API key for cloud generation backends, read from the configured env var
    pub fn generation_api_key(&self) -> Option<String> {
        std::env::var(&self.generation.api_key_env).ok().filter(|k| !k.is_empty())
    }
}
