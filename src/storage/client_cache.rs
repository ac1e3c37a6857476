use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use super::ObjectStorage;
use crate::config::S3Configuration;

pub type ClientHandle = Arc<dyn ObjectStorage>;

/// Client factory trait / 客户端工厂 trait
pub trait ClientFactory: Send + Sync {
    /// Factory type name / 工厂类型名称
    fn client_type(&self) -> &'static str;

    /// Build a client bound to the configuration / 根据配置创建客户端
    fn create_client(&self, config: &S3Configuration) -> Result<ClientHandle>;
}

/// Client cache, one handle per distinct configuration / 客户端缓存
/// Entries live as long as the cache; nothing is evicted or refreshed.
pub struct S3ClientCache {
    factory: Arc<dyn ClientFactory>,
    clients: RwLock<HashMap<S3Configuration, ClientHandle>>,
}

impl S3ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Cache backed by the rust-s3 client factory / 使用 rust-s3 客户端
    pub fn s3() -> Self {
        Self::new(Arc::new(crate::drivers::s3::S3ClientFactory))
    }

    /// Get or create the client for a configuration / 获取或创建客户端
    pub fn get_client(&self, config: &S3Configuration) -> Result<ClientHandle> {
        if let Some(client) = self.clients.read().get(config) {
            return Ok(client.clone());
        }

        // Build outside the lock; on a race the first inserted handle wins
        let client = self.factory.create_client(config)?;

        let mut clients = self.clients.write();
        let client = clients.entry(config.clone()).or_insert(client).clone();
        tracing::debug!(
            "{} client ready for {} in region {}",
            self.factory.client_type(),
            config.s3_uri(""),
            config.region()
        );
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
