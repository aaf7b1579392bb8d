use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub flowdex: FlowdexConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Paths and logging
#[derive(Debug, Clone, Deserialize)]
pub struct FlowdexConfig {
    /// Root directory containing workflow documents.
    /// Top-level sub-directories become categories (folders) automatically.
    pub workflows_dir: PathBuf,
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Indexing pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of documents read and parsed concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

/// Classification policy
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Optional node-type vocabulary table; the built-in table is used when unset
    #[serde(default)]
    pub vocabulary_path: Option<PathBuf>,
    #[serde(default = "default_simple_max_nodes")]
    pub simple_max_nodes: usize,
    #[serde(default = "default_medium_max_nodes")]
    pub medium_max_nodes: usize,
    /// Distinct integration count that bumps the complexity tier by one level
    #[serde(default = "default_integration_escalation")]
    pub integration_escalation: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            vocabulary_path: None,
            simple_max_nodes: default_simple_max_nodes(),
            medium_max_nodes: default_medium_max_nodes(),
            integration_escalation: default_integration_escalation(),
        }
    }
}

/// Search pagination defaults
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: usize,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_parallelism() -> usize {
    8
}

fn default_simple_max_nodes() -> usize {
    5
}

fn default_medium_max_nodes() -> usize {
    15
}

fn default_integration_escalation() -> usize {
    6
}

fn default_per_page() -> usize {
    20
}

fn default_max_per_page() -> usize {
    100
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in FLOWDEX_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("FLOWDEX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Build a configuration with default tuning for the given paths.
    ///
    /// Not validated: the workflows directory may be created afterwards.
    pub fn for_paths<P: AsRef<Path>, Q: AsRef<Path>>(workflows_dir: P, db_path: Q) -> Self {
        Self {
            flowdex: FlowdexConfig {
                workflows_dir: workflows_dir.as_ref().to_path_buf(),
                db_path: db_path.as_ref().to_path_buf(),
                log_level: default_log_level(),
            },
            index: IndexConfig::default(),
            classifier: ClassifierConfig::default(),
            search: SearchConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let root = &self.flowdex.workflows_dir;
        if !root.exists() {
            anyhow::bail!(
                "workflows_dir path does not exist: {}. Set workflows_dir in config.toml to your workflows directory.",
                root.display()
            );
        }

        if !root.is_dir() {
            anyhow::bail!("workflows_dir must be a directory, not a file: {}", root.display());
        }

        if self.index.parallelism == 0 {
            anyhow::bail!("index.parallelism must be greater than 0");
        }

        if self.classifier.medium_max_nodes <= self.classifier.simple_max_nodes {
            anyhow::bail!("classifier.medium_max_nodes must be greater than simple_max_nodes");
        }

        if self.classifier.integration_escalation == 0 {
            anyhow::bail!("classifier.integration_escalation must be greater than 0");
        }

        if let Some(path) = &self.classifier.vocabulary_path {
            if !path.is_file() {
                anyhow::bail!("classifier.vocabulary_path is not a file: {}", path.display());
            }
        }

        if self.search.default_per_page == 0 || self.search.max_per_page == 0 {
            anyhow::bail!("search page sizes must be greater than 0");
        }

        if self.search.default_per_page > self.search.max_per_page {
            anyhow::bail!("search.default_per_page must not exceed search.max_per_page");
        }

        Ok(())
    }

    /// Clamp a requested page size into `1..=max_per_page`, using the default when absent
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.search.default_per_page)
            .clamp(1, self.search.max_per_page)
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.flowdex.db_path
    }

    /// Get the workflows root path
    pub fn workflows_dir(&self) -> &Path {
        &self.flowdex.workflows_dir
    }
}
