//! Configuration management for Quill.
//!
//! Parses `quill.toml` with serde and discovers it in the current directory
//! or any parent. Every section is optional; missing values fall back to the
//! defaults documented on each field.
//!
//! ## Environment Variable Expansion
//!
//! - `${VAR}` expands to the value of VAR, errors if unset
//! - `${VAR:-default}` expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.addr`
//! - `update.secret`
//!
//! ## Mutation
//!
//! [`Config::update`] applies a change to a clone, validates the clone, and
//! only then replaces `self`. A failed validation leaves the live
//! configuration untouched.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "quill.toml";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// How the site is built and served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pre-built output served from memory, refreshed by update triggers.
    #[default]
    Production,
    /// Every request re-reads layout and templates and renders from source.
    Edit,
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serving mode.
    pub mode: Mode,
    /// Expose debug information to templates.
    pub debug: bool,
    /// Server configuration.
    pub server: ServerConfig,
    /// Directory layout (relative strings from TOML).
    paths: PathsConfigRaw,
    /// Read cache configuration.
    pub cache: CacheConfig,
    /// Remote update configuration.
    pub update: UpdateConfig,
    /// Per-stage timeouts.
    pub timeouts: TimeoutsConfig,
    /// Search index generation.
    pub search: SearchConfig,

    /// Resolved directory layout (set after loading).
    #[serde(skip)]
    pub paths_resolved: PathsConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port`.
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ":9292".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct PathsConfigRaw {
    repo_dir: Option<String>,
    content_dir: Option<String>,
    assets_dir: Option<String>,
    output_dir: Option<String>,
    templates_dir: Option<String>,
    meta_dir: Option<String>,
}

/// Resolved directory layout with absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathsConfig {
    /// Git checkout that updates fetch into.
    pub repo_dir: PathBuf,
    /// Content source tree (markdown pages, `.index.md`, `.footer.md`).
    pub content_dir: PathBuf,
    /// Static assets, content-addressed at build time.
    pub assets_dir: PathBuf,
    /// Rendered output tree.
    pub output_dir: PathBuf,
    /// Page templates.
    pub templates_dir: PathBuf,
    /// Build metadata: persisted layout and search index files.
    pub meta_dir: PathBuf,
}

impl PathsConfig {
    /// Persisted navigation layout (`<meta_dir>/layout.json`).
    #[must_use]
    pub fn layout_file(&self) -> PathBuf {
        self.meta_dir.join("layout.json")
    }

    /// Search documents handed to the indexer.
    #[must_use]
    pub fn search_docs_file(&self) -> PathBuf {
        self.meta_dir.join("search-pre-index.json")
    }

    /// Index produced by the indexer.
    #[must_use]
    pub fn search_index_file(&self) -> PathBuf {
        self.meta_dir.join("search-index.json")
    }
}

/// Read cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Rendered page cache size in MiB.
    pub page_cache_mb: u64,
    /// Asset cache size in MiB.
    pub asset_cache_mb: u64,
    /// Gzip compressible entries.
    pub compress: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_cache_mb: 1024,
            asset_cache_mb: 1024,
            compress: true,
        }
    }
}

impl CacheConfig {
    /// Page cache capacity in bytes.
    #[must_use]
    pub fn page_cache_bytes(&self) -> u64 {
        self.page_cache_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Asset cache capacity in bytes.
    #[must_use]
    pub fn asset_cache_bytes(&self) -> u64 {
        self.asset_cache_mb.saturating_mul(BYTES_PER_MB)
    }
}

/// Remote update configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Remote name.
    pub remote: String,
    /// Branch tracked by updates.
    pub branch: String,
    /// Shared secret required by update triggers. Empty disables triggers.
    pub secret: String,
    /// Asset registration worker count.
    pub workers: usize,
    /// Private key for fetching over SSH.
    pub ssh_key: Option<PathBuf>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_owned(),
            branch: "main".to_owned(),
            secret: String::new(),
            workers: 8,
            ssh_key: None,
        }
    }
}

/// Per-stage timeouts in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub fetch: u64,
    pub reset: u64,
    pub lfs: u64,
    /// HEAD commit lookup.
    pub head: u64,
    /// Search index generation.
    pub index: u64,
    /// Single asset change check.
    pub asset_check: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch: 30,
            reset: 30,
            lfs: 60,
            head: 10,
            index: 30,
            asset_check: 5,
        }
    }
}

impl TimeoutsConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch)
    }

    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset)
    }

    #[must_use]
    pub fn lfs_timeout(&self) -> Duration {
        Duration::from_secs(self.lfs)
    }

    #[must_use]
    pub fn head_timeout(&self) -> Duration {
        Duration::from_secs(self.head)
    }

    #[must_use]
    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index)
    }

    #[must_use]
    pub fn asset_check_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_check)
    }
}

/// Search index generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Node executable.
    pub node: String,
    /// Index generation script, relative to the config file.
    pub script: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            node: "node".to_owned(),
            script: "search/gen_index.js".to_owned(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`update.secret`").
        field: String,
        /// Error message (e.g., "${`QUILL_SECRET`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `quill.toml` in the current directory and its parents, falling back
    /// to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit `config_path` doesn't exist, parsing
    /// fails, an environment reference is unset, or validation fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Self::load_from_file(path);
        }
        if let Some(discovered) = Self::discover_config() {
            return Self::load_from_file(&discovered);
        }
        let cwd = std::env::current_dir().unwrap_or_default();
        Ok(Self::default_with_base(&cwd))
    }

    /// Parse configuration from TOML text, resolving paths against `base`.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`], minus file lookup.
    pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Apply `change` to a copy of the configuration and keep it only if it
    /// validates.
    ///
    /// # Errors
    ///
    /// Returns the validation error; `self` is unchanged in that case.
    pub fn update<F>(&mut self, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Self),
    {
        let mut next = self.clone();
        change(&mut next);
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Check that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.addr, "server.addr")?;
        require_non_empty(&self.update.remote, "update.remote")?;
        require_non_empty(&self.update.branch, "update.branch")?;
        if self.update.workers == 0 {
            return Err(ConfigError::Validation(
                "update.workers must be greater than 0".to_owned(),
            ));
        }
        require_positive(self.cache.page_cache_mb, "cache.page_cache_mb")?;
        require_positive(self.cache.asset_cache_mb, "cache.asset_cache_mb")?;

        let t = &self.timeouts;
        for (value, field) in [
            (t.fetch, "timeouts.fetch"),
            (t.reset, "timeouts.reset"),
            (t.lfs, "timeouts.lfs"),
            (t.head, "timeouts.head"),
            (t.index, "timeouts.index"),
            (t.asset_check, "timeouts.asset_check"),
        ] {
            require_positive(value, field)?;
        }

        require_non_empty(&self.search.node, "search.node")?;
        require_non_empty(&self.search.script, "search.script")?;
        Ok(())
    }

    /// Resolved search script path.
    #[must_use]
    pub fn search_script(&self) -> PathBuf {
        let base = self
            .config_path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));
        base.join(&self.search.script)
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            mode: Mode::default(),
            debug: false,
            server: ServerConfig::default(),
            paths: PathsConfigRaw::default(),
            cache: CacheConfig::default(),
            update: UpdateConfig::default(),
            timeouts: TimeoutsConfig::default(),
            search: SearchConfig::default(),
            paths_resolved: PathsConfig::default(),
            config_path: None,
        };
        config.resolve_paths(base);
        config
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.addr = expand::expand_env(&self.server.addr, "server.addr")?;
        self.update.secret = expand::expand_env(&self.update.secret, "update.secret")?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: Option<&str>, default: &str| base.join(path.unwrap_or(default));
        let content_dir = resolve(self.paths.content_dir.as_deref(), "public");
        let meta_dir = match self.paths.meta_dir.as_deref() {
            Some(dir) => base.join(dir),
            None => content_dir.join(".meta"),
        };
        self.paths_resolved = PathsConfig {
            repo_dir: match self.paths.repo_dir.as_deref() {
                Some(dir) => base.join(dir),
                None => base.to_path_buf(),
            },
            assets_dir: resolve(self.paths.assets_dir.as_deref(), "assets"),
            output_dir: resolve(self.paths.output_dir.as_deref(), "dist"),
            templates_dir: resolve(self.paths.templates_dir.as_deref(), "templates"),
            content_dir,
            meta_dir,
        };
        if let Some(key) = &self.update.ssh_key
            && key.is_relative()
        {
            self.update.ssh_key = Some(base.join(key));
        }
    }
}
