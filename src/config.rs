//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `PUBCHEM_*` environment variable overrides.

use crate::index::{IndexFormat, IndexPaths};
use crate::matching::{AmbiguityPolicy, DEFAULT_THRESHOLD};
use crate::retrieval::{PcFetchConfig, PollPolicy, RetrieveMode, WgetDownloader, DEFAULT_ENDPOINT, DEFAULT_PROGRAM};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Persisted name index location
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// `json` or `bincode`
    #[serde(default = "default_index_format")]
    pub format: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("pubchem-resolver").to_string_lossy().to_string())
        .unwrap_or_else(|| "./pubchem_data".to_string())
}

fn default_index_format() -> String {
    "json".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            format: default_index_format(),
        }
    }
}

impl IndexConfig {
    /// The three index files inside `data_dir`
    pub fn paths(&self) -> Result<IndexPaths, ConfigError> {
        let format: IndexFormat = self.format.parse().map_err(|error| ConfigError::Invalid {
            field: "index.format",
            error,
        })?;
        Ok(IndexPaths::in_dir_as(&self.data_path(), format))
    }

    /// `data_dir` with a leading `~` expanded to the home directory
    pub fn data_path(&self) -> PathBuf {
        let home = dirs::home_dir();
        match (self.data_dir.as_str(), home) {
            ("~", Some(home)) => home,
            (dir, Some(home)) if dir.starts_with("~/") => home.join(&dir[2..]),
            (dir, _) => PathBuf::from(dir),
        }
    }
}

/// Approximate matching defaults
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// `first_inserted`, `lowest_identifier` or `reject`
    #[serde(default = "default_ambiguity_policy")]
    pub ambiguity_policy: String,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_ambiguity_policy() -> String {
    AmbiguityPolicy::default().to_string()
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            ambiguity_policy: default_ambiguity_policy(),
        }
    }
}

impl MatchingConfig {
    pub fn ambiguity_policy(&self) -> Result<AmbiguityPolicy, ConfigError> {
        self.ambiguity_policy.parse().map_err(|error| ConfigError::Invalid {
            field: "matching.ambiguity_policy",
            error,
        })
    }
}

/// pc_fetch client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_retrieve_mode")]
    pub retrieve_mode: String,

    /// Transfer program invoked as `<program> -q -O <file> <url>`
    #[serde(default = "default_downloader")]
    pub downloader: String,

    #[serde(default)]
    pub poll: PollConfig,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_retrieve_mode() -> String {
    RetrieveMode::default().to_string()
}

fn default_downloader() -> String {
    DEFAULT_PROGRAM.to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout(),
            retrieve_mode: default_retrieve_mode(),
            downloader: default_downloader(),
            poll: PollConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn retrieve_mode(&self) -> Result<RetrieveMode, ConfigError> {
        self.retrieve_mode.parse().map_err(|error| ConfigError::Invalid {
            field: "retrieval.retrieve_mode",
            error,
        })
    }

    pub fn fetch_config(&self) -> PcFetchConfig {
        PcFetchConfig {
            endpoint: self.endpoint.clone(),
            request_timeout_ms: self.request_timeout_ms,
            ..PcFetchConfig::default()
        }
    }

    pub fn downloader(&self) -> WgetDownloader {
        WgetDownloader::new(self.downloader.clone())
    }
}

/// Poll loop pacing and bounds; a bound of 0 means unbounded
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

fn default_base_delay() -> u64 {
    875
}

fn default_jitter() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    240
}

fn default_max_wait() -> u64 {
    30 * 60 // 30 minutes
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            jitter_ms: default_jitter(),
            max_attempts: default_max_attempts(),
            max_wait_secs: default_max_wait(),
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            max_wait: (self.max_wait_secs > 0).then(|| Duration::from_secs(self.max_wait_secs)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// A config file that exists but cannot be read or parsed is an error;
    /// it is never silently replaced by the defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("pubchem-resolver").join("config.toml")),
            Some(PathBuf::from("./pubchem.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file among `candidates`, else defaults plus environment
    fn load_first(candidates: &[PathBuf]) -> Result<Self, ConfigError> {
        match candidates.iter().find(|path| path.exists()) {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::from_env()),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `PUBCHEM_*` overrides read through `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Index overrides
        if let Some(data_dir) = lookup("PUBCHEM_INDEX_DIR") {
            self.index.data_dir = data_dir;
        }
        if let Some(format) = lookup("PUBCHEM_INDEX_FORMAT") {
            self.index.format = format;
        }

        // Matching overrides
        if let Some(threshold) = lookup("PUBCHEM_MATCH_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.matching.threshold = t;
            }
        }
        if let Some(policy) = lookup("PUBCHEM_AMBIGUITY_POLICY") {
            self.matching.ambiguity_policy = policy;
        }

        // Retrieval overrides
        if let Some(endpoint) = lookup("PUBCHEM_FETCH_ENDPOINT") {
            self.retrieval.endpoint = endpoint;
        }
        if let Some(mode) = lookup("PUBCHEM_RETRIEVE_MODE") {
            self.retrieval.retrieve_mode = mode;
        }
        if let Some(downloader) = lookup("PUBCHEM_DOWNLOADER") {
            self.retrieval.downloader = downloader;
        }
        if let Some(attempts) = lookup("PUBCHEM_POLL_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse() {
                self.retrieval.poll.max_attempts = a;
            }
        }
        if let Some(wait) = lookup("PUBCHEM_POLL_MAX_WAIT_SECS") {
            if let Ok(w) = wait.parse() {
                self.retrieval.poll.max_wait_secs = w;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("PUBCHEM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PUBCHEM_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {error}")]
    Invalid { field: &'static str, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# pubchem-resolver Configuration
#
# Environment variables override these settings:
# - PUBCHEM_INDEX_DIR
# - PUBCHEM_INDEX_FORMAT
# - PUBCHEM_MATCH_THRESHOLD
# - PUBCHEM_AMBIGUITY_POLICY
# - PUBCHEM_FETCH_ENDPOINT
# - PUBCHEM_RETRIEVE_MODE
# - PUBCHEM_DOWNLOADER
# - PUBCHEM_POLL_MAX_ATTEMPTS
# - PUBCHEM_POLL_MAX_WAIT_SECS
# - PUBCHEM_LOG_LEVEL
# - PUBCHEM_LOG_FORMAT

[index]
# Directory holding names, substance_ids and compound_ids
data_dir = "~/.local/share/pubchem-resolver"

# Index encoding: json or bincode
format = "json"

[matching]
# Jaro-Winkler score a fuzzy match must exceed
threshold = 0.99

# Pick when one name maps to several identifiers:
# first_inserted, lowest_identifier or reject
ambiguity_policy = "first_inserted"

[retrieval]
# pc_fetch form endpoint
endpoint = "https://pubchem.ncbi.nlm.nih.gov/pc_fetch/pc_fetch.cgi"

# Request timeout in milliseconds
request_timeout_ms = 30000

# Output format: xml, asnt, asnb, json, sdf, smiles, image
retrieve_mode = "image"

# Transfer program, called as <program> -q -O <file> <url>
downloader = "wget"

[retrieval.poll]
# Delay between polls is base_delay_ms plus up to jitter_ms
base_delay_ms = 875
jitter_ms = 500

# Give up after this many polls (0 = never)
max_attempts = 240

# Give up after this many seconds (0 = never)
max_wait_secs = 1800

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.matching.threshold, 0.99);
        assert_eq!(config.matching.ambiguity_policy().unwrap(), AmbiguityPolicy::FirstInserted);
        assert_eq!(config.retrieval.retrieve_mode().unwrap(), RetrieveMode::Image);
        assert_eq!(config.retrieval.poll.policy(), PollPolicy::default());
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.index.format, "json");
        assert_eq!(config.retrieval.poll.max_attempts, 240);
        assert_eq!(config.retrieval.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pubchem.toml");
        std::fs::write(
            &path,
            r#"
[index]
data_dir = "/srv/pubchem"
format = "bincode"

[retrieval]
retrieve_mode = "sdf"

[retrieval.poll]
max_attempts = 0
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let paths = config.index.paths().unwrap();
        assert_eq!(paths.names, PathBuf::from("/srv/pubchem/names.bin"));
        assert_eq!(config.retrieval.retrieve_mode().unwrap(), RetrieveMode::Sdf);

        let policy = config.retrieval.poll.policy();
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.max_wait, Some(Duration::from_secs(1800)));
        assert_eq!(config.matching.threshold, 0.99);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[matching\nthreshold = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let bad = dir.path().join("pubchem.toml");
        std::fs::write(&bad, "[retrieval\nendpoint = ").unwrap();

        assert!(matches!(
            Config::load_first(&[missing.clone(), bad.clone()]),
            Err(ConfigError::Parse { path, .. }) if path == bad
        ));
        assert!(Config::load_first(&[missing]).is_ok());
    }

    #[test]
    fn test_data_dir_tilde_expansion() {
        let mut index = IndexConfig {
            data_dir: "~/.local/share/pubchem-resolver".to_string(),
            format: "json".to_string(),
        };
        if let Some(home) = dirs::home_dir() {
            assert_eq!(index.data_path(), home.join(".local/share/pubchem-resolver"));
            assert!(index.paths().unwrap().names.starts_with(&home));
        }

        index.data_dir = "/srv/~pubchem".to_string();
        assert_eq!(index.data_path(), PathBuf::from("/srv/~pubchem"));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.index.format = "yaml".to_string();
        config.retrieval.retrieve_mode = "png".to_string();
        config.matching.ambiguity_policy = "random".to_string();

        assert!(matches!(config.index.paths(), Err(ConfigError::Invalid { field: "index.format", .. })));
        assert!(config.retrieval.retrieve_mode().is_err());
        assert!(config.matching.ambiguity_policy().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PUBCHEM_INDEX_DIR", "/tmp/idx"),
            ("PUBCHEM_MATCH_THRESHOLD", "0.9"),
            ("PUBCHEM_AMBIGUITY_POLICY", "lowest"),
            ("PUBCHEM_POLL_MAX_ATTEMPTS", "not-a-number"),
            ("PUBCHEM_RETRIEVE_MODE", "xml"),
            ("PUBCHEM_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.index.data_dir, "/tmp/idx");
        assert_eq!(config.matching.threshold, 0.9);
        assert_eq!(config.matching.ambiguity_policy().unwrap(), AmbiguityPolicy::LowestIdentifier);
        assert_eq!(config.retrieval.poll.max_attempts, 240);
        assert_eq!(config.retrieval.retrieve_mode().unwrap(), RetrieveMode::Xml);
        assert_eq!(config.logging.format, "json");
    }
}
