use crate::error::AnagramError;
use crate::pair_merger::MergeStrategy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_LINES_PER_PARTITION: usize = 50_000;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_FILE_EXTENSION: &str = ".txt";

pub const ENV_MAX_LINES: &str = "ANAGRAM_MAX_LINES";
pub const ENV_WORKERS: &str = "ANAGRAM_WORKERS";
pub const ENV_EXTENSION: &str = "ANAGRAM_EXTENSION";
pub const ENV_TEMP_DIR: &str = "ANAGRAM_TEMP_DIR";
pub const ENV_OUTPUT_DIR: &str = "ANAGRAM_OUTPUT_DIR";
pub const ENV_TIMEOUT_SECS: &str = "ANAGRAM_TIMEOUT_SECS";

/// Tunables for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounds per-partition memory during local grouping
    pub max_lines_per_partition: usize,
    pub worker_pool_size: usize,
    /// Accepted input suffix, also used for intermediate and output files
    pub file_extension: String,
    /// Parent of the per-run working directories
    pub temp_root: PathBuf,
    pub output_dir: PathBuf,
    /// Hard deadline for a whole run
    pub timeout: Option<Duration>,
    pub merge_strategy: MergeStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_lines_per_partition: DEFAULT_MAX_LINES_PER_PARTITION,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            temp_root: PathBuf::from("./tempfiles"),
            output_dir: PathBuf::from("./output"),
            timeout: None,
            merge_strategy: MergeStrategy::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `ANAGRAM_*` environment variables
    pub fn from_env() -> Result<Self, AnagramError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `ANAGRAM_*` key
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AnagramError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_LINES) {
            config.max_lines_per_partition = parse_number(ENV_MAX_LINES, &value)?;
        }
        if let Some(value) = lookup(ENV_WORKERS) {
            config.worker_pool_size = parse_number(ENV_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_EXTENSION) {
            config.file_extension = value;
        }
        if let Some(value) = lookup(ENV_TEMP_DIR) {
            config.temp_root = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = parse_number(ENV_TIMEOUT_SECS, &value)?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_max_lines_per_partition(mut self, max_lines: usize) -> Self {
        self.max_lines_per_partition = max_lines;
        self
    }

    pub fn with_worker_pool_size(mut self, workers: usize) -> Self {
        self.worker_pool_size = workers;
        self
    }

    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<(), AnagramError> {
        if self.max_lines_per_partition == 0 {
            return Err(AnagramError::Config(
                "max lines per partition must be at least 1".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(AnagramError::Config(
                "worker pool size must be at least 1".to_string(),
            ));
        }
        if self.file_extension.len() < 2 || !self.file_extension.starts_with('.') {
            return Err(AnagramError::Config(format!(
                "file extension {:?} must look like \".txt\"",
                self.file_extension
            )));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(AnagramError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        tracing::info!(
            max_lines_per_partition = self.max_lines_per_partition,
            worker_pool_size = self.worker_pool_size,
            extension = %self.file_extension,
            temp_root = %self.temp_root.display(),
            output_dir = %self.output_dir.display(),
            timeout_secs = ?self.timeout.map(|t| t.as_secs()),
            strategy = ?self.merge_strategy,
            "pipeline configuration"
        );
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AnagramError> {
    value
        .trim()
        .parse()
        .map_err(|_| AnagramError::Config(format!("{} must be a non-negative integer, got {:?}", key, value)))
}
