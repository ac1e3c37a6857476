//! In-memory object storage / 内存对象存储
//!
//! Behaves like one S3 bucket: missing keys and a missing bucket report the same
//! error codes. Records every put and counts calls so hosts and tests can inspect
//! what was sent. Faults can be injected per key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};

use crate::config::S3Configuration;
use crate::error::ObjectStoreError;
use crate::storage::{
    ClientFactory, ClientHandle, DeleteFailure, DeleteObjectsOutput, ObjectMeta, ObjectReader, ObjectStorage,
    PutObjectRequest, Visibility,
};

/// Stored object / 已存储对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub visibility: Visibility,
}

/// One recorded put request / 上传记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub key: String,
    pub size: u64,
    pub visibility: Visibility,
}

/// Calls made against the store / 调用计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub head: usize,
    pub put: usize,
    pub copy: usize,
    pub delete: usize,
    pub delete_objects: usize,
    pub create_bucket: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    bucket_exists: bool,
    objects: BTreeMap<String, StoredObject>,
    puts: Vec<PutRecord>,
    calls: CallCounts,
    faults: HashMap<String, (u16, String)>,
    put_faults: HashMap<String, (u16, String)>,
    delete_faults: HashMap<String, String>,
    read_faults: HashSet<String>,
}

/// In-memory bucket; clones share the same contents / 内存存储桶，克隆共享数据
#[derive(Debug, Clone)]
pub struct MemoryObjectStorage {
    bucket: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryObjectStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Arc::new(Mutex::new(MemoryState {
                bucket_exists: true,
                ..Default::default()
            })),
        }
    }

    /// Store whose bucket has not been created yet / 存储桶尚未创建
    pub fn without_bucket(bucket: &str) -> Self {
        let store = Self::new(bucket);
        store.state.lock().bucket_exists = false;
        store
    }

    /// Seed an object without recording a put / 预置对象（不计入上传记录）
    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.state.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: None,
                visibility: Visibility::Default,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().objects.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    pub fn bucket_exists(&self) -> bool {
        self.state.lock().bucket_exists
    }

    pub fn put_log(&self) -> Vec<PutRecord> {
        self.state.lock().puts.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls.clone()
    }

    /// Every request touching `key` fails with a service error / 注入故障
    pub fn fail_key(&self, key: &str, status: u16, code: &str) {
        self.state
            .lock()
            .faults
            .insert(key.to_string(), (status, code.to_string()));
    }

    /// Only uploads of `key` fail / 仅上传该键时失败
    pub fn fail_put(&self, key: &str, status: u16, code: &str) {
        self.state
            .lock()
            .put_faults
            .insert(key.to_string(), (status, code.to_string()));
    }

    /// Body of `key` breaks off with a connection reset after its bytes / 读取对象内容时连接中断
    pub fn fail_read(&self, key: &str) {
        self.state.lock().read_faults.insert(key.to_string());
    }

    /// Deleting `key` fails with `code` / 删除该键时失败
    pub fn fail_delete(&self, key: &str, code: &str) {
        self.state
            .lock()
            .delete_faults
            .insert(key.to_string(), code.to_string());
    }
}

impl MemoryState {
    fn check(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        if !self.bucket_exists {
            return Err(ObjectStoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        if let Some((status, code)) = self.faults.get(key) {
            return Err(ObjectStoreError::Service {
                status: *status,
                code: code.clone(),
                message: format!("injected fault for {}", key),
            });
        }
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<&StoredObject, ObjectStoreError> {
        self.objects
            .get(key)
            .ok_or_else(|| ObjectStoreError::NoSuchKey { key: key.to_string() })
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn get_object(&self, key: &str) -> Result<ObjectReader, ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.get += 1;
        state.check(&self.bucket, key)?;
        let data = state.lookup(key)?.data.clone();
        if state.read_faults.contains(key) {
            return Ok(Box::new(InterruptedReader { remaining: Some(data) }));
        }
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.head += 1;
        state.check(&self.bucket, key)?;
        let object = state.lookup(key)?;
        Ok(ObjectMeta {
            size: object.data.len() as u64,
            content_type: object.content_type.clone(),
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<(), ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.put += 1;
        state.check(&self.bucket, &request.key)?;
        if let Some((status, code)) = state.put_faults.get(&request.key) {
            return Err(ObjectStoreError::Service {
                status: *status,
                code: code.clone(),
                message: format!("injected upload fault for {}", request.key),
            });
        }
        state.puts.push(PutRecord {
            key: request.key.clone(),
            size: request.body.len() as u64,
            visibility: request.visibility,
        });
        state.objects.insert(
            request.key,
            StoredObject {
                data: request.body,
                content_type: request.content_type,
                visibility: request.visibility,
            },
        );
        Ok(())
    }

    async fn copy_object(&self, src: &str, dest: &str, visibility: Visibility) -> Result<(), ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.copy += 1;
        state.check(&self.bucket, src)?;
        state.check(&self.bucket, dest)?;
        let mut object = state.lookup(src)?.clone();
        object.visibility = visibility;
        state.objects.insert(dest.to_string(), object);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.delete += 1;
        state.check(&self.bucket, key)?;
        if let Some(code) = state.delete_faults.get(key) {
            return Err(ObjectStoreError::Service {
                status: 403,
                code: code.clone(),
                message: format!("{} while deleting {}", code, key),
            });
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteObjectsOutput, ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.delete_objects += 1;
        if !state.bucket_exists {
            return Err(ObjectStoreError::NoSuchBucket {
                bucket: self.bucket.clone(),
            });
        }

        let mut output = DeleteObjectsOutput::default();
        for key in keys {
            if let Some(code) = state.delete_faults.get(key).cloned() {
                output.errors.push(DeleteFailure {
                    key: key.clone(),
                    message: format!("{} while deleting {}", code, key),
                    code,
                });
            } else {
                state.objects.remove(key);
                output.deleted.push(key.clone());
            }
        }
        Ok(output)
    }

    async fn create_bucket(&self) -> Result<(), ObjectStoreError> {
        let mut state = self.state.lock();
        state.calls.create_bucket += 1;
        state.bucket_exists = true;
        tracing::info!("Memory bucket created: {}", self.bucket);
        Ok(())
    }
}

/// Yields the stored bytes, then fails like a dropped connection / 返回数据后模拟连接断开
struct InterruptedReader {
    remaining: Option<Bytes>,
}

impl AsyncRead for InterruptedReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.remaining.take() {
            Some(data) if !data.is_empty() => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                if n < data.len() {
                    self.remaining = Some(data.slice(n..));
                }
                Poll::Ready(Ok(()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset while reading object body",
            ))),
        }
    }
}

/// Factory handing out handles to one shared in-memory bucket / 内存客户端工厂
#[derive(Debug)]
pub struct MemoryClientFactory {
    storage: MemoryObjectStorage,
    created: AtomicUsize,
}

impl MemoryClientFactory {
    pub fn new(storage: MemoryObjectStorage) -> Self {
        Self {
            storage,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of clients built so far / 已创建的客户端数量
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MemoryClientFactory {
    fn client_type(&self) -> &'static str {
        "memory"
    }

    fn create_client(&self, _config: &S3Configuration) -> Result<ClientHandle> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.storage.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_put_get_head() {
        let store = MemoryObjectStorage::new("assets");
        store
            .put_object(PutObjectRequest::new("img/a.png", Bytes::from_static(b"png")).visibility(Visibility::PublicRead))
            .await
            .unwrap();

        let mut body = Vec::new();
        store.get_object("img/a.png").await.unwrap().read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"png");
        assert_eq!(store.head_object("img/a.png").await.unwrap().size, 3);
        assert_eq!(store.put_log()[0].visibility, Visibility::PublicRead);
    }

    #[tokio::test]
    async fn test_missing_key_and_bucket() {
        let store = MemoryObjectStorage::new("assets");
        assert!(store.head_object("nope").await.unwrap_err().is_not_found());

        let store = MemoryObjectStorage::without_bucket("assets");
        let err = store
            .put_object(PutObjectRequest::new("a.css", Bytes::new()))
            .await
            .unwrap_err();
        assert!(err.is_no_such_bucket());

        store.create_bucket().await.unwrap();
        assert!(store.bucket_exists());
        store.put_object(PutObjectRequest::new("a.css", Bytes::new())).await.unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let store = MemoryObjectStorage::new("assets");
        let other = store.clone();
        store.insert("a.css", "body {}");
        assert!(other.contains("a.css"));
        assert_eq!(other.keys(), vec!["a.css".to_string()]);
    }

    #[tokio::test]
    async fn test_copy_sets_visibility() {
        let store = MemoryObjectStorage::new("assets");
        store.insert("a.png", "png");
        store.copy_object("a.png", "b.png", Visibility::PublicRead).await.unwrap();
        assert_eq!(store.object("b.png").unwrap().visibility, Visibility::PublicRead);
        assert!(store.copy_object("zzz", "b.png", Visibility::Default).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_put_and_read_faults() {
        let store = MemoryObjectStorage::new("assets");
        store.insert("a.png", "png");
        store.fail_put("b.png", 403, "AccessDenied");
        store.fail_read("a.png");

        assert!(store.head_object("b.png").await.unwrap_err().is_not_found());
        let err = store
            .put_object(PutObjectRequest::new("b.png", Bytes::from_static(b"b")))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Service { status: 403, .. }));
        assert!(store.put_log().is_empty());

        let mut body = Vec::new();
        let mut reader = store.get_object("a.png").await.unwrap();
        let err = reader.read_to_end(&mut body).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
    }
}
