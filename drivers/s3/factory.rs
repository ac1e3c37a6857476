//! S3客户端工厂

use std::sync::Arc;

use anyhow::Result;

use super::driver::S3ObjectStorage;
use crate::config::S3Configuration;
use crate::storage::{ClientFactory, ClientHandle};

/// S3客户端工厂
pub struct S3ClientFactory;

impl ClientFactory for S3ClientFactory {
    fn client_type(&self) -> &'static str {
        "s3"
    }

    fn create_client(&self, config: &S3Configuration) -> Result<ClientHandle> {
        Ok(Arc::new(S3ObjectStorage::new(config)?))
    }
}
