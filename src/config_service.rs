//! S3 configuration service / S3 配置服务
//!
//! Resolves the configuration from system properties on first use and keeps it
//! for the life of the service. Changed properties need a restart.
//! 首次使用时解析配置并缓存，属性变更需要重启

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::config::{
    S3Configuration, ACCESS_KEY_ID, BUCKET_SUB_DIRECTORY, DEFAULT_BUCKET_NAME, DEFAULT_BUCKET_REGION,
    ENDPOINT_URI, SECRET_KEY, STATIC_ASSET_FILE_EXTENSION_PATTERN, VERSION_SUB_DIRECTORY,
};
use crate::error::Result;
use crate::properties::PropertySource;

pub struct S3ConfigurationService {
    properties: Arc<dyn PropertySource>,
    config: OnceCell<Arc<S3Configuration>>,
}

impl S3ConfigurationService {
    pub fn new(properties: Arc<dyn PropertySource>) -> Self {
        Self {
            properties,
            config: OnceCell::new(),
        }
    }

    /// Get the configuration, resolving it on first call / 获取配置（首次调用时解析）
    /// A failed resolution is not cached / 解析失败不缓存
    pub fn lookup_configuration(&self) -> Result<Arc<S3Configuration>> {
        self.config
            .get_or_try_init(|| self.init_configuration().map(Arc::new))
            .cloned()
    }

    fn init_configuration(&self) -> Result<S3Configuration> {
        let started = Instant::now();

        let mut builder = S3Configuration::builder();
        if let Some(v) = self.lookup_property(SECRET_KEY) {
            builder = builder.secret_key(v);
        }
        if let Some(v) = self.lookup_property(DEFAULT_BUCKET_NAME) {
            builder = builder.bucket_name(v);
        }
        if let Some(v) = self.lookup_property(DEFAULT_BUCKET_REGION) {
            builder = builder.region(v);
        }
        if let Some(v) = self.lookup_property(ACCESS_KEY_ID) {
            builder = builder.access_key_id(v);
        }
        if let Some(v) = self.lookup_property(ENDPOINT_URI) {
            builder = builder.endpoint(v);
        }
        if let Some(v) = self.lookup_property(BUCKET_SUB_DIRECTORY) {
            builder = builder.bucket_sub_directory(v);
        }
        if let Some(v) = self.lookup_property(VERSION_SUB_DIRECTORY) {
            builder = builder.version_sub_directory(v);
        }
        if let Some(v) = self.lookup_property(STATIC_ASSET_FILE_EXTENSION_PATTERN) {
            builder = builder.static_asset_file_extension_pattern(v);
        }

        let config = builder.build().map_err(|e| {
            tracing::error!("{}", e);
            e
        })?;

        tracing::trace!(
            "{} - using {} in region {}; setup time = {}ms",
            config.endpoint().unwrap_or("<default endpoint>"),
            config.s3_uri(config.bucket_sub_directory().unwrap_or("")),
            config.region(),
            started.elapsed().as_millis()
        );

        Ok(config)
    }

    fn lookup_property(&self, name: &str) -> Option<String> {
        self.properties.resolve_property(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::properties::MapProperties;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts lookups so memoization can be observed
    struct CountingProperties {
        inner: MapProperties,
        lookups: AtomicUsize,
    }

    impl PropertySource for CountingProperties {
        fn resolve_property(&self, name: &str) -> Option<String> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve_property(name)
        }
    }

    fn valid_properties() -> MapProperties {
        MapProperties::new()
            .with(SECRET_KEY, "secret")
            .with(ACCESS_KEY_ID, "AKIDEXAMPLE")
            .with(DEFAULT_BUCKET_NAME, "assets")
            .with(DEFAULT_BUCKET_REGION, "us-west-2")
            .with(ENDPOINT_URI, "https://s3.amazonaws.com")
            .with(BUCKET_SUB_DIRECTORY, "/shop")
            .with(STATIC_ASSET_FILE_EXTENSION_PATTERN, "png|css")
    }

    #[test]
    fn test_lookup_reads_every_property() {
        let service = S3ConfigurationService::new(Arc::new(valid_properties()));
        let config = service.lookup_configuration().unwrap();

        assert_eq!(config.bucket_name(), "assets");
        assert_eq!(config.region().as_str(), "us-west-2");
        assert_eq!(config.endpoint(), Some("https://s3-us-west-2.amazonaws.com"));
        assert_eq!(config.bucket_sub_directory(), Some("/shop"));
        assert!(config.static_asset_pattern().is_some());
        assert_eq!(config.version_sub_directory(), None);
    }

    #[test]
    fn test_lookup_is_memoized() {
        let props = Arc::new(CountingProperties {
            inner: valid_properties(),
            lookups: AtomicUsize::new(0),
        });
        let service = S3ConfigurationService::new(props.clone());

        let first = service.lookup_configuration().unwrap();
        let reads = props.lookups.load(Ordering::SeqCst);
        let second = service.lookup_configuration().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(props.lookups.load(Ordering::SeqCst), reads);
    }

    #[test]
    fn test_lookup_lists_all_missing_fields() {
        let props = MapProperties::new().with(DEFAULT_BUCKET_REGION, "atlantis-1");
        let service = S3ConfigurationService::new(Arc::new(props));

        match service.lookup_configuration() {
            Err(StorageError::Configuration { violations }) => {
                assert_eq!(violations.len(), 4);
                assert!(violations.iter().any(|v| v.contains(SECRET_KEY)));
                assert!(violations.iter().any(|v| v.contains(ACCESS_KEY_ID)));
                assert!(violations.iter().any(|v| v.contains(DEFAULT_BUCKET_NAME)));
                assert!(violations.iter().any(|v| v.contains("atlantis-1")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_failed_lookup_is_not_cached() {
        let props = Arc::new(CountingProperties {
            inner: MapProperties::new(),
            lookups: AtomicUsize::new(0),
        });
        let service = S3ConfigurationService::new(props.clone());

        assert!(service.lookup_configuration().is_err());
        let reads = props.lookups.load(Ordering::SeqCst);
        assert!(service.lookup_configuration().is_err());
        assert_eq!(props.lookups.load(Ordering::SeqCst), reads * 2);
    }
}
