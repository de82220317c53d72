//! Run configuration loaded from a JSON file, with environment overrides
//! and per-instance sections for multi-tenant libraries.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::directory::DEFAULT_PAGE_SIZE;
use crate::error::ConfigError;
use crate::filters::FilterSet;
use crate::hasher::HashAlgorithm;

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Settings a tenant may override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub search_filters: FilterSet,
    #[serde(default)]
    pub exclusion_filters: FilterSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub source_directory: PathBuf,
    #[serde(default)]
    pub download_directory: Option<PathBuf>,
    #[serde(default)]
    pub scratch_directory: Option<PathBuf>,
    #[serde(default)]
    pub lock_directory: Option<PathBuf>,
    #[serde(default)]
    pub search_filters: FilterSet,
    #[serde(default)]
    pub exclusion_filters: FilterSet,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
    /// Active instance short name, set by `select_instance`
    #[serde(skip)]
    pub instance: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            source_directory: PathBuf::new(),
            download_directory: None,
            scratch_directory: None,
            lock_directory: None,
            search_filters: FilterSet::new(),
            exclusion_filters: FilterSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
            hash_algorithm: HashAlgorithm::default(),
            instances: BTreeMap::new(),
            instance: None,
        }
    }
}

impl SyncConfig {
    /// Load from `path`, then apply `MEDIASYNC_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: SyncConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(v) = env::var("MEDIASYNC_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Ok(v) = env::var("MEDIASYNC_API_KEY") {
            self.api_key = v;
        }
        if let Ok(v) = env::var("MEDIASYNC_API_SECRET") {
            self.api_secret = v;
        }
    }

    /// Switch to a tenant: merge its overrides over the base settings.
    pub fn select_instance(&mut self, shortname: &str) -> Result<(), ConfigError> {
        let overrides = self
            .instances
            .get(shortname)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownInstance(shortname.to_string()))?;

        if let Some(key) = overrides.api_key {
            self.api_key = key;
        }
        if let Some(secret) = overrides.api_secret {
            self.api_secret = secret;
        }
        self.search_filters = self.search_filters.merged(&overrides.search_filters);
        self.exclusion_filters = self.exclusion_filters.merged(&overrides.exclusion_filters);
        self.instance = Some(shortname.to_string());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("api_base_url"));
        }
        if self.source_directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing("source_directory"));
        }
        Ok(())
    }

    /// Source tree root, suffixed with the instance short name when one is active.
    pub fn source_root(&self) -> PathBuf {
        match &self.instance {
            Some(name) => self.source_directory.join(name),
            None => self.source_directory.clone(),
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_directory.clone().unwrap_or_else(env::temp_dir)
    }

    /// Where recovered originals are written; defaults to the source root.
    pub fn download_root(&self) -> PathBuf {
        self.download_directory
            .clone()
            .unwrap_or_else(|| self.source_root())
    }

    pub fn lock_path(&self) -> PathBuf {
        let dir = self.lock_directory.clone().unwrap_or_else(|| self.scratch_dir());
        dir.join(crate::lock::RunLock::file_name(self.instance.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "api_base_url": "https://api.example.com/v1",
        "api_key": "base-key",
        "api_secret": "base-secret",
        "source_directory": "/srv/media",
        "exclusion_filters": {"*": "test"},
        "instances": {
            "east": {"api_key": "east-key", "search_filters": {"custom.site": "east"}}
        }
    }"#;

    #[test]
    fn test_defaults() {
        let config: SyncConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Md5);
        assert_eq!(config.source_root(), PathBuf::from("/srv/media"));
        assert_eq!(config.download_root(), PathBuf::from("/srv/media"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_select_instance() {
        let mut config: SyncConfig = serde_json::from_str(SAMPLE).unwrap();
        config.select_instance("east").unwrap();
        assert_eq!(config.api_key, "east-key");
        assert_eq!(config.api_secret, "base-secret");
        assert_eq!(config.source_root(), PathBuf::from("/srv/media/east"));
        assert_eq!(
            config.search_filters.to_query().get("search:custom.site").map(String::as_str),
            Some("east")
        );
        assert!(!config.exclusion_filters.is_empty());
        assert!(config.lock_path().ends_with("mediasync-east.lock"));
    }

    #[test]
    fn test_unknown_instance() {
        let mut config: SyncConfig = serde_json::from_str(SAMPLE).unwrap();
        assert!(matches!(
            config.select_instance("west"),
            Err(ConfigError::UnknownInstance(_))
        ));
    }

    #[test]
    fn test_validate_requires_base_url() {
        let config = SyncConfig {
            source_directory: PathBuf::from("/srv"),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Missing("api_base_url"))));
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediasync.json");
        fs::write(&path, "{ not json").unwrap();
        match SyncConfig::load(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
