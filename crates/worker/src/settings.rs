//! Parsed, validated settings the worker runs with.

use offcache_core::config::{AppConfig, ConfigError};
use offcache_core::{GenerationId, ResourceManifest};
use regex::Regex;
use url::Url;

/// Everything the worker needs from `AppConfig`, already parsed.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// The single generation this build reads and writes.
    pub generation: GenerationId,
    pub origin: Url,
    pub app_name: String,
    pub font_origins: Vec<Url>,
    pub shell_urls: Vec<Url>,
    pub exclusions: Vec<Regex>,
    pub manifest: ResourceManifest,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            generation: config.generation_id(),
            origin: config.origin()?,
            app_name: config.app_name.clone(),
            font_origins: config.font_origin_urls()?,
            shell_urls: config.shell_urls()?,
            exclusions: config.exclusion_patterns()?,
            manifest: config.resource_manifest()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let settings = WorkerSettings::from_config(&AppConfig::default()).unwrap();
        assert_eq!(settings.generation, AppConfig::default().generation_id());
        assert_eq!(settings.origin.as_str(), "http://localhost:8080/");
        assert_eq!(settings.font_origins.len(), 2);
        assert_eq!(settings.manifest.len(), 3);
    }

    #[test]
    fn test_from_invalid_config() {
        let config = AppConfig { excluded_paths: vec!["[".into()], ..Default::default() };
        assert!(WorkerSettings::from_config(&config).is_err());
    }
}
