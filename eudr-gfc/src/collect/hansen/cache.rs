//! Object cache shared between machines for Hansen tiles and manifests.

use std::path::{Path, PathBuf};

use crate::collect::global_variables::{dataset_slug, MANIFEST_FILE_NAME, TILE_FILE_EXTENSION};
use crate::commons::determinism::write_bytes_atomic;
use crate::error::{ForestError, Result};

/// Key of a layer file: `deps/hansen/<slug>/tiles/<tile_id>/<layer>.tif`
pub fn tile_cache_key(dataset_version: &str, tile_id: &str, layer: &str) -> String {
    format!(
        "deps/hansen/{}/tiles/{}/{}.{}",
        dataset_slug(dataset_version),
        tile_id,
        layer,
        TILE_FILE_EXTENSION
    )
}

/// Key of an AOI manifest: `deps/hansen/<slug>/manifests/<aoi_id>/tiles_manifest.json`
pub fn manifest_cache_key(dataset_version: &str, aoi_id: &str) -> String {
    format!(
        "deps/hansen/{}/manifests/{}/{}",
        dataset_slug(dataset_version),
        aoi_id,
        MANIFEST_FILE_NAME
    )
}

/// Keyed blob store used as a second tier behind the local data plane
pub trait ObjectCache: Sync {
    /// Make sure the bucket can be used, creating it where the backend allows
    fn ensure_bucket(&self) -> Result<()>;

    /// Copy `key` to `dest`; `Ok(false)` when the key does not exist
    fn get_file_if_exists(&self, key: &str, dest: &Path) -> Result<bool>;

    fn put_file(&self, key: &str, local_path: &Path, content_type: &str) -> Result<()>;
}

/// Cache backed by a directory, one file per key
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ForestError::Cache(format!("invalid cache key: {:?}", key)));
        }
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }
}

impl ObjectCache for DirectoryCache {
    fn ensure_bucket(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| ForestError::io(&self.root, e))
    }

    fn get_file_if_exists(&self, key: &str, dest: &Path) -> Result<bool> {
        let source = self.object_path(key)?;
        if !source.is_file() {
            return Ok(false);
        }
        let bytes = std::fs::read(&source).map_err(|e| ForestError::io(&source, e))?;
        write_bytes_atomic(dest, &bytes)?;
        tracing::debug!(key, dest = %dest.display(), "restored from directory cache");
        Ok(true)
    }

    fn put_file(&self, key: &str, local_path: &Path, _content_type: &str) -> Result<()> {
        let target = self.object_path(key)?;
        let bytes = std::fs::read(local_path).map_err(|e| ForestError::io(local_path, e))?;
        write_bytes_atomic(&target, &bytes)?;
        tracing::debug!(key, "stored in directory cache");
        Ok(())
    }
}

#[cfg(feature = "s3")]
pub use self::s3::S3Cache;

#[cfg(feature = "s3")]
mod s3 {
    use std::path::Path;

    use bytes::Bytes;
    use object_store::aws::{AmazonS3, AmazonS3Builder};
    use object_store::path::Path as ObjectPath;
    use object_store::ObjectStore;
    use tokio::runtime::Runtime;

    use super::ObjectCache;
    use crate::commons::determinism::write_bytes_atomic;
    use crate::config::ObjectCacheConfig;
    use crate::error::{ForestError, Result};

    /// MinIO / S3 cache through `object_store`, driven from blocking code
    pub struct S3Cache {
        store: AmazonS3,
        bucket: String,
        runtime: Runtime,
    }

    impl S3Cache {
        pub fn new(config: &ObjectCacheConfig) -> Result<Self> {
            config.validate()?;
            let endpoint = config.endpoint_url();
            let store = AmazonS3Builder::new()
                .with_endpoint(&endpoint)
                .with_bucket_name(&config.bucket)
                .with_access_key_id(&config.access_key)
                .with_secret_access_key(&config.secret_key)
                // MinIO ignores the region but the signer needs one
                .with_region("us-east-1")
                .with_allow_http(endpoint.starts_with("http://"))
                .build()
                .map_err(|e| ForestError::Cache(format!("failed to create S3 client: {}", e)))?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| ForestError::Cache(format!("failed to start cache runtime: {}", e)))?;

            Ok(S3Cache {
                store,
                bucket: config.bucket.clone(),
                runtime,
            })
        }
    }

    impl ObjectCache for S3Cache {
        /// `object_store` cannot create buckets; this only checks the bucket answers.
        fn ensure_bucket(&self) -> Result<()> {
            self.runtime
                .block_on(self.store.list_with_delimiter(None))
                .map(|_| ())
                .map_err(|e| {
                    ForestError::Cache(format!("bucket {} is not usable: {}", self.bucket, e))
                })
        }

        fn get_file_if_exists(&self, key: &str, dest: &Path) -> Result<bool> {
            let location = ObjectPath::from(key);
            let fetched = self.runtime.block_on(async {
                match self.store.get(&location).await {
                    Ok(result) => result.bytes().await.map(Some),
                    Err(object_store::Error::NotFound { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            });
            match fetched {
                Ok(Some(bytes)) => {
                    write_bytes_atomic(dest, &bytes)?;
                    tracing::info!(bucket = %self.bucket, key, size = bytes.len(), "restored from object cache");
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(ForestError::Cache(format!("failed to read {}: {}", key, e))),
            }
        }

        fn put_file(&self, key: &str, local_path: &Path, content_type: &str) -> Result<()> {
            let data = std::fs::read(local_path).map_err(|e| ForestError::io(local_path, e))?;
            let size = data.len();
            let location = ObjectPath::from(key);
            self.runtime
                .block_on(self.store.put(&location, Bytes::from(data)))
                .map_err(|e| ForestError::Cache(format!("failed to write {}: {}", key, e)))?;
            tracing::info!(bucket = %self.bucket, key, size, content_type, "stored in object cache");
            Ok(())
        }
    }
}
