//! Explicit configuration for the tile bootstrap.
//!
//! Built once at the process boundary (CLI, service) and handed to the
//! core by reference. Nothing here reads the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{DATASET_VERSION_DEFAULT, DEFAULT_HANSEN_URL_TEMPLATE};
use crate::error::{ForestError, Result};

/// Connection parameters of the MinIO/S3 object cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCacheConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Use HTTPS when the endpoint carries no scheme
    pub secure: bool,
}

impl ObjectCacheConfig {
    /// Assemble from optional parts; all four must be present and non-empty.
    pub fn from_parts(
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        bucket: Option<String>,
        secure: bool,
    ) -> Result<Self> {
        let config = ObjectCacheConfig {
            endpoint: endpoint.unwrap_or_default(),
            access_key: access_key.unwrap_or_default(),
            secret_key: secret_key.unwrap_or_default(),
            bucket: bucket.unwrap_or_default(),
            secure,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("endpoint", &self.endpoint),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("bucket", &self.bucket),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(ForestError::Config(format!(
                "object cache is enabled but {} {} missing (endpoint, access_key, secret_key and bucket are required together)",
                missing.join(", "),
                if missing.len() == 1 { "is" } else { "are" }
            )));
        }
        Ok(())
    }

    /// Endpoint with an explicit scheme
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if self.secure {
            format!("https://{}", endpoint)
        } else {
            format!("http://{}", endpoint)
        }
    }
}

/// Policy and locations for acquiring Hansen tiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Root of the local data plane (`external/`, `cache/`, `derived/` live below)
    pub data_root: PathBuf,
    pub dataset_version: String,
    /// Source URL template with `{layer}` and `{tile_id}` or `{hansen_tile}`
    pub url_template: String,
    /// Download missing tiles from the source URL
    pub download: bool,
    /// Forbid any network download regardless of `download`
    pub offline: bool,
    /// Object cache, `None` when disabled
    pub cache: Option<ObjectCacheConfig>,
}

impl BootstrapConfig {
    /// Defaults: pinned dataset version and URL template, downloads on, no cache
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        BootstrapConfig {
            data_root: data_root.into(),
            dataset_version: DATASET_VERSION_DEFAULT.to_string(),
            url_template: DEFAULT_HANSEN_URL_TEMPLATE.to_string(),
            download: true,
            offline: false,
            cache: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(ForestError::Config("data_root must be non-empty".to_string()));
        }
        if self.dataset_version.trim().is_empty() {
            return Err(ForestError::Config(
                "dataset_version must be non-empty".to_string(),
            ));
        }
        if !self.url_template.contains("{layer}") {
            return Err(ForestError::Config(format!(
                "url_template must contain {{layer}}: {}",
                self.url_template
            )));
        }
        if !self.url_template.contains("{tile_id}") && !self.url_template.contains("{hansen_tile}") {
            return Err(ForestError::Config(format!(
                "url_template must contain {{tile_id}} or {{hansen_tile}}: {}",
                self.url_template
            )));
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        Ok(())
    }

    /// Downloads happen only when enabled and not offline
    pub fn effective_download(&self) -> bool {
        self.download && !self.offline
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_config() -> ObjectCacheConfig {
        ObjectCacheConfig {
            endpoint: "minio.local:9000".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            bucket: "cache".to_string(),
            secure: true,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = BootstrapConfig::new("/tmp/data");
        assert!(config.validate().is_ok());
        assert!(config.effective_download());
        assert!(!config.cache_enabled());
    }

    #[test]
    fn test_offline_disables_download() {
        let mut config = BootstrapConfig::new("/tmp/data");
        config.offline = true;
        assert!(!config.effective_download());
    }

    #[test]
    fn test_template_placeholders_required() {
        let mut config = BootstrapConfig::new("/tmp/data");
        config.url_template = "https://example.org/{layer}.tif".to_string();
        assert!(matches!(config.validate(), Err(ForestError::Config(_))));
        config.url_template = "https://example.org/{tile_id}.tif".to_string();
        assert!(config.validate().is_err());
        config.url_template = "https://example.org/{layer}_{tile_id}.tif".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_fields_required_together() {
        let err = ObjectCacheConfig::from_parts(
            Some("minio.local".to_string()),
            Some("access".to_string()),
            None,
            Some(" ".to_string()),
            true,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("but secret_key, bucket are missing"));
        assert!(!message.contains("endpoint, access_key, secret_key, bucket"));

        let err = ObjectCacheConfig::from_parts(None, None, None, None, true).unwrap_err();
        assert!(err
            .to_string()
            .contains("but endpoint, access_key, secret_key, bucket are missing"));
    }

    #[test]
    fn test_invalid_cache_fails_bootstrap_config() {
        let mut config = BootstrapConfig::new("/tmp/data");
        let mut cache = cache_config();
        cache.bucket.clear();
        config.cache = Some(cache);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_url() {
        let mut cache = cache_config();
        assert_eq!(cache.endpoint_url(), "https://minio.local:9000");
        cache.secure = false;
        assert_eq!(cache.endpoint_url(), "http://minio.local:9000");
        cache.endpoint = "https://s3.example.org".to_string();
        assert_eq!(cache.endpoint_url(), "https://s3.example.org");
    }
}
