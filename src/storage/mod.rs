use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::ObjectStoreError;

/// Object content reader / 对象内容读取器
pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send>;

/// Canned visibility applied at upload/copy time / 上传或复制时的访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Bucket/store default policy, no ACL sent / 使用默认策略
    Default,
    /// `public-read` canned ACL / 公共读
    PublicRead,
}

impl Visibility {
    /// Canned ACL header value, None for default / ACL 头的值
    pub fn canned_acl(&self) -> Option<&'static str> {
        match self {
            Visibility::Default => None,
            Visibility::PublicRead => Some("public-read"),
        }
    }
}

/// Object metadata from a HEAD request / 对象元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Put object request / 上传请求
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub visibility: Visibility,
}

impl PutObjectRequest {
    pub fn new(key: impl Into<String>, body: Bytes) -> Self {
        Self {
            key: key.into(),
            body,
            content_type: None,
            visibility: Visibility::Default,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One failed key of a batch delete / 批量删除中失败的键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Batch delete result / 批量删除结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteObjectsOutput {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

/// Object storage capability bound to one bucket (provides only primitive operations) / 对象存储接口
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket this client operates on / 存储桶名称
    fn bucket_name(&self) -> &str;

    /// Download object content / 下载对象
    async fn get_object(&self, key: &str) -> Result<ObjectReader, ObjectStoreError>;

    /// Fetch object metadata / 获取对象元数据
    async fn head_object(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError>;

    /// Upload object / 上传对象
    async fn put_object(&self, request: PutObjectRequest) -> Result<(), ObjectStoreError>;

    /// Server-side copy within the bucket / 桶内服务端复制
    async fn copy_object(&self, src: &str, dest: &str, visibility: Visibility) -> Result<(), ObjectStoreError>;

    /// Delete object; deleting a missing key succeeds / 删除对象
    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Delete several keys in one request / 批量删除
    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteObjectsOutput, ObjectStoreError>;

    /// Create the bucket / 创建存储桶
    async fn create_bucket(&self) -> Result<(), ObjectStoreError>;
}

pub mod client_cache;
pub mod local_cache;

pub use client_cache::{ClientFactory, ClientHandle, S3ClientCache};
pub use local_cache::{DirectoryCache, LocalCache};
