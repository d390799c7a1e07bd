use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::index::{IndexDefinition, PollPolicy, Similarity};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ragsync: RagsyncConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Paths and logging
#[derive(Debug, Clone, Deserialize)]
pub struct RagsyncConfig {
    /// Default ingestion root used when no path is given on the command line.
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ollama server connection
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_model")]
    pub chat_model: String,
    #[serde(default = "default_model")]
    pub embedding_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            chat_model: default_model(),
            embedding_model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
        }
    }
}

/// Text splitting parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Never split inside a fenced code block.
    #[serde(default = "default_true")]
    pub keep_code_blocks: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            keep_code_blocks: true,
        }
    }
}

/// Vector index definition and readiness polling
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default)]
    pub similarity: Similarity,
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            dimensions: default_dimensions(),
            similarity: Similarity::default(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
            timeout_secs: default_index_timeout_secs(),
        }
    }
}

impl IndexConfig {
    pub fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            name: self.name.clone(),
            path: IndexDefinition::DEFAULT_PATH.to_string(),
            dimensions: self.dimensions,
            similarity: self.similarity,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(self.poll_initial_ms),
            max_delay: Duration::from_millis(self.poll_max_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Passages handed to the model by the QA chain.
    #[serde(default = "default_qa_k")]
    pub qa_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            score_threshold: None,
            qa_k: default_qa_k(),
        }
    }
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("./docs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:3b".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_batch_size() -> usize {
    32
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    128
}

fn default_true() -> bool {
    true
}

fn default_index_name() -> String {
    "vector_index_dotProduct_2048".to_string()
}

fn default_dimensions() -> usize {
    2048
}

fn default_poll_initial_ms() -> u64 {
    250
}

fn default_poll_max_ms() -> u64 {
    5000
}

fn default_index_timeout_secs() -> u64 {
    300
}

fn default_k() -> usize {
    4
}

fn default_qa_k() -> usize {
    10
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAGSYNC_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAGSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Load and validate a specific config file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.llm.server_url)
            .with_context(|| format!("llm.server_url is not a valid URL: {}", self.llm.server_url))?;

        if self.llm.batch_size == 0 {
            anyhow::bail!("llm.batch_size must be greater than 0");
        }

        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be greater than 0");
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.chunk_overlap must be less than chunk_size");
        }

        if self.index.dimensions == 0 {
            anyhow::bail!("index.dimensions must be greater than 0");
        }

        if self.index.poll_initial_ms == 0 || self.index.poll_initial_ms > self.index.poll_max_ms {
            anyhow::bail!("index.poll_initial_ms must be in 1..=poll_max_ms");
        }

        if self.search.default_k == 0 || self.search.qa_k == 0 {
            anyhow::bail!("search.default_k and search.qa_k must be greater than 0");
        }

        if let Some(threshold) = self.search.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("search.score_threshold must be between 0.0 and 1.0");
            }
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.ragsync.db_path
    }

    /// Get the default ingestion root
    pub fn docs_root(&self) -> &Path {
        &self.ragsync.docs_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[ragsync]
docs_root = "./docs"
db_path = "./test.db"
log_level = "debug"

[llm]
server_url = "http://localhost:11434"
chat_model = "qwen2.5:3b"
embedding_model = "nomic-embed-text"
timeout_secs = 30
max_retries = 2
batch_size = 16

[chunking]
chunk_size = 300
chunk_overlap = 50
keep_code_blocks = false

[index]
name = "vector_index_cosine_768"
dimensions = 768
similarity = "cosine"
poll_initial_ms = 100
poll_max_ms = 1000
timeout_secs = 10

[search]
default_k = 5
score_threshold = 0.7
qa_k = 8
"#;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_config_full_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, FULL_CONFIG);

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ragsync.log_level, "debug");
        assert_eq!(config.llm.embedding_model, "nomic-embed-text");
        assert_eq!(config.chunking.chunk_size, 300);
        assert!(!config.chunking.keep_code_blocks);
        assert_eq!(config.index.similarity, Similarity::Cosine);
        assert_eq!(config.search.score_threshold, Some(0.7));

        let def = config.index.definition();
        assert_eq!(def.name, "vector_index_cosine_768");
        assert_eq!(def.dimensions, 768);

        let policy = config.index.poll_policy();
        assert_eq!(policy.initial, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(1000));
        assert_eq!(policy.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "[ragsync]\ndb_path = \"./x.db\"\n");

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ragsync.docs_root, PathBuf::from("./docs"));
        assert_eq!(config.llm.server_url, "http://127.0.0.1:11434");
        assert_eq!(config.chunking, ChunkingConfig::default());
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 128);
        assert_eq!(config.index.name, "vector_index_dotProduct_2048");
        assert_eq!(config.index.dimensions, 2048);
        assert_eq!(config.index.similarity, Similarity::DotProduct);
        assert_eq!(config.search.qa_k, 10);
        assert!(config.search.score_threshold.is_none());
    }

    #[test]
    fn test_config_rejects_overlap_not_below_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[ragsync]\ndb_path = \"./x.db\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        );

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_config_rejects_bad_server_url() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[ragsync]\ndb_path = \"./x.db\"\n[llm]\nserver_url = \"not a url\"\n",
        );

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_config_rejects_unknown_similarity() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[ragsync]\ndb_path = \"./x.db\"\n[index]\nsimilarity = \"manhattan\"\n",
        );

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_config_load_from_env_var() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, FULL_CONFIG);

        let original = std::env::var("RAGSYNC_CONFIG").ok();
        std::env::set_var("RAGSYNC_CONFIG", path.to_str().unwrap());
        let config = Config::load();
        std::env::remove_var("RAGSYNC_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RAGSYNC_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.search.default_k, 5);
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("RAGSYNC_CONFIG").ok();
        std::env::set_var("RAGSYNC_CONFIG", "nonexistent.toml");
        let config = Config::load();
        std::env::remove_var("RAGSYNC_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RAGSYNC_CONFIG", v);
        }
        assert!(config.is_err());
    }
}
