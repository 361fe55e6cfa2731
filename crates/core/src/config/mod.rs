//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::GenerationId;
use crate::manifest::ResourceManifest;

mod validation;

pub use validation::ConfigError;

/// Version baked into this build; the default generation suffix.
pub const BUILD_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via OFFCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Naming prefix shared by every generation this system owns.
    ///
    /// Set via OFFCACHE_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix of the current generation. Fixed per deployment.
    ///
    /// Set via OFFCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Origin the application is served from.
    ///
    /// Set via OFFCACHE_APP_ORIGIN environment variable.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Name shown on notifications and the offline page.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Cross-origin font hosts whose responses may be cached.
    #[serde(default = "default_font_origins")]
    pub font_origins: Vec<String>,

    /// Resources seeded into the generation at install time.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Candidate shell pages served to navigations when offline, in order.
    #[serde(default = "default_shell_paths")]
    pub shell_paths: Vec<String>,

    /// Regular expressions matched against the full request URL; matches
    /// are never intercepted.
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_cache_prefix() -> String {
    "offcache".into()
}

fn default_cache_version() -> String {
    BUILD_VERSION.into()
}

fn default_app_origin() -> String {
    "http://localhost:8080".into()
}

fn default_app_name() -> String {
    "Offline App".into()
}

fn default_font_origins() -> Vec<String> {
    vec!["https://fonts.googleapis.com".into(), "https://fonts.gstatic.com".into()]
}

fn default_manifest() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/manifest.json".into()]
}

fn default_shell_paths() -> Vec<String> {
    vec!["/".into(), "/index.html".into()]
}

fn default_excluded_paths() -> Vec<String> {
    vec!["/api/".into(), "-extension:".into()]
}

fn default_user_agent() -> String {
    concat!("offcache/", env!("CARGO_PKG_VERSION")).into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            app_origin: default_app_origin(),
            app_name: default_app_name(),
            font_origins: default_font_origins(),
            manifest: default_manifest(),
            shell_paths: default_shell_paths(),
            excluded_paths: default_excluded_paths(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The one generation id this deployment writes to.
    pub fn generation_id(&self) -> GenerationId {
        GenerationId::new(&self.cache_prefix, &self.cache_version)
    }

    pub fn origin(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.app_origin)
            .map_err(|e| ConfigError::Invalid { field: "app_origin".into(), reason: e.to_string() })
    }

    pub fn font_origin_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.font_origins
            .iter()
            .map(|o| {
                Url::parse(o).map_err(|e| ConfigError::Invalid { field: "font_origins".into(), reason: format!("{o}: {e}") })
            })
            .collect()
    }

    pub fn resource_manifest(&self) -> Result<ResourceManifest, ConfigError> {
        ResourceManifest::resolve(&self.origin()?, &self.manifest)
            .map_err(|e| ConfigError::Invalid { field: "manifest".into(), reason: e.to_string() })
    }

    /// Shell page URLs resolved against the app origin.
    pub fn shell_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin()?;
        self.shell_paths
            .iter()
            .map(|p| {
                origin
                    .join(p)
                    .map_err(|e| ConfigError::Invalid { field: "shell_paths".into(), reason: format!("{p}: {e}") })
            })
            .collect()
    }

    pub fn exclusion_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.excluded_paths
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| ConfigError::Invalid { field: "excluded_paths".into(), reason: e.to_string() })
            })
            .collect()
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
