use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{EdgeKinds, ExpansionPolicy, SeedSpecifier};
use crate::error::FetchError;

pub const DEFAULT_CONFIG_FILE: &str = "paper-fetcher.json";
pub const DEFAULT_OUTPUT_DIR: &str = "papers";
pub const DEFAULT_METADATA_FILE: &str = "papers_metadata.json";
pub const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_UNPAYWALL_URL: &str = "https://api.unpaywall.org/v2";
/// Per edge kind; deep offsets are rejected by the service anyway.
pub const DEFAULT_MAX_NEIGHBORS: usize = 1_000;
const MAX_SEARCH_LIMIT: usize = 100;
const KEYED_INTERVAL_MS: u64 = 1_000;
const ANONYMOUS_INTERVAL_MS: u64 = 2_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// On-disk configuration. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub metadata_file: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub edges: Option<EdgeKinds>,
    #[serde(default)]
    pub on_service_error: Option<ExpansionPolicy>,
    #[serde(default)]
    pub search_limit: Option<usize>,
    #[serde(default)]
    pub max_papers: Option<usize>,
    #[serde(default)]
    pub max_neighbors: Option<usize>,
    #[serde(default)]
    pub request_interval_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub unpaywall_email: Option<String>,
    #[serde(default)]
    pub unpaywall_url: Option<String>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub env_api_key: Option<String>,
    pub output_dir: Option<String>,
    pub metadata_file: Option<String>,
    pub depth: Option<u32>,
    pub edges: Option<EdgeKinds>,
    pub on_service_error: Option<ExpansionPolicy>,
    pub search_limit: Option<usize>,
    pub max_papers: Option<usize>,
    pub unpaywall_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScholarConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_interval: Duration,
    pub timeout: Duration,
    pub max_neighbors: Option<usize>,
    /// Unpaywall lookups are only made when an email is configured.
    pub unpaywall_email: Option<String>,
    pub unpaywall_url: String,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_interval: Duration::from_millis(ANONYMOUS_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_neighbors: Some(DEFAULT_MAX_NEIGHBORS),
            unpaywall_email: None,
            unpaywall_url: DEFAULT_UNPAYWALL_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkerConfig {
    pub max_depth: u32,
    pub edges: EdgeKinds,
    pub policy: ExpansionPolicy,
    pub max_papers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_dir: Utf8PathBuf,
    pub metadata_file: String,
    pub search_limit: usize,
    pub download_timeout: Duration,
    pub scholar: ScholarConfig,
    pub walker: WalkerConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file. An explicit path must exist; otherwise the
    /// working directory and then the user config directory are tried, and a
    /// missing file yields the defaults.
    pub fn load(path: Option<&str>) -> Result<Config, FetchError> {
        let candidates = match path {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(FetchError::ConfigRead(path));
                }
                vec![path]
            }
            None => default_config_paths(),
        };

        let Some(config_path) = candidates.into_iter().find(|path| path.exists()) else {
            return Ok(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| FetchError::ConfigParse(err.to_string()))
    }

    /// Merges file values and overrides. Command-line values win over the
    /// file, the file wins over the environment and built-in defaults.
    pub fn resolve_config(
        config: Config,
        overrides: Overrides,
        seed: &SeedSpecifier,
    ) -> Result<ResolvedConfig, FetchError> {
        let api_key = overrides
            .api_key
            .or(config.api_key)
            .or(overrides.env_api_key)
            .filter(|key| !key.trim().is_empty());

        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
        if output_dir.trim().is_empty() {
            return Err(FetchError::InvalidOption(
                "output directory must not be empty".to_string(),
            ));
        }

        let metadata_file = overrides
            .metadata_file
            .or(config.metadata_file)
            .unwrap_or_else(|| DEFAULT_METADATA_FILE.to_string());
        validate_file_name(&metadata_file)?;

        let search_limit = overrides
            .search_limit
            .or(config.search_limit)
            .unwrap_or(DEFAULT_SEARCH_LIMIT);
        if search_limit == 0 || search_limit > MAX_SEARCH_LIMIT {
            return Err(FetchError::InvalidOption(format!(
                "search limit must be between 1 and {MAX_SEARCH_LIMIT}, got {search_limit}"
            )));
        }

        let max_papers = overrides.max_papers.or(config.max_papers);
        if max_papers == Some(0) {
            return Err(FetchError::InvalidOption(
                "max papers must be at least 1".to_string(),
            ));
        }

        let max_neighbors = config.max_neighbors.unwrap_or(DEFAULT_MAX_NEIGHBORS);
        if max_neighbors == 0 {
            return Err(FetchError::InvalidOption(
                "max neighbors must be at least 1".to_string(),
            ));
        }

        let unpaywall_email = overrides
            .unpaywall_email
            .or(config.unpaywall_email)
            .filter(|email| !email.trim().is_empty());

        let max_depth = overrides
            .depth
            .or(config.depth)
            .unwrap_or_else(|| default_depth(seed));

        let default_interval = if api_key.is_some() {
            KEYED_INTERVAL_MS
        } else {
            ANONYMOUS_INTERVAL_MS
        };

        Ok(ResolvedConfig {
            output_dir: Utf8PathBuf::from(output_dir),
            metadata_file,
            search_limit,
            download_timeout: Duration::from_secs(
                config
                    .download_timeout_secs
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            ),
            scholar: ScholarConfig {
                base_url: config
                    .base_url
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                api_key,
                request_interval: Duration::from_millis(
                    config.request_interval_ms.unwrap_or(default_interval),
                ),
                timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                max_neighbors: Some(max_neighbors),
                unpaywall_email,
                unpaywall_url: config
                    .unpaywall_url
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_UNPAYWALL_URL.to_string()),
            },
            walker: WalkerConfig {
                max_depth,
                edges: overrides.edges.or(config.edges).unwrap_or_default(),
                policy: overrides
                    .on_service_error
                    .or(config.on_service_error)
                    .unwrap_or_default(),
                max_papers,
            },
        })
    }
}

/// A directly named paper expands one level; a search result is fetched alone.
pub fn default_depth(seed: &SeedSpecifier) -> u32 {
    match seed {
        SeedSpecifier::Id(_) => 1,
        SeedSpecifier::Search(_) => 0,
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
    if let Some(dirs) = ProjectDirs::from("", "", "paper-fetcher") {
        paths.push(dirs.config_dir().join("config.json"));
    }
    paths
}

fn validate_file_name(name: &str) -> Result<(), FetchError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(FetchError::InvalidOption(format!(
            "metadata file must be a plain file name, got {name:?}"
        )));
    }
    Ok(())
}
