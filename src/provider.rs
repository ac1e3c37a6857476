//! S3 file provider / S3 文件服务
//!
//! Stores site assets in one S3 bucket and mirrors downloads into a local
//! cache directory. Storage keys come from [`build_resource_name`]; the client
//! for the active configuration comes from the shared [`S3ClientCache`].
//! 将站点资源存入 S3，并把下载内容缓存到本地目录

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::S3Configuration;
use crate::config_service::S3ConfigurationService;
use crate::error::{ObjectStoreError, Result, StorageError};
use crate::naming::{build_resource_name, RequestSiteContext, SiteContext};
use crate::storage::{ClientHandle, LocalCache, PutObjectRequest, S3ClientCache};

/// Initial buffer for stream uploads / 流式上传的初始缓冲区大小
const READ_BUFFER_HINT: usize = 8 * 1024 * 1024;

/// Kind of resource being requested / 资源类型
/// Only recorded in trace output / 仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileApplicationType {
    #[default]
    All,
    Image,
    Static,
    SiteMap,
}

/// Local staging directory holding files to upload / 本地暂存目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWorkArea {
    pub file_path_location: PathBuf,
}

impl FileWorkArea {
    pub fn new(file_path_location: impl Into<PathBuf>) -> Self {
        Self {
            file_path_location: file_path_location.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    Copied,
    /// Source was gone but the destination already existed / 源不存在但目标已存在
    AlreadyAtDestination,
}

/// Copy/move result / 复制或移动结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub status: CopyStatus,
    /// Non-fatal problem, e.g. the source of a move could not be deleted / 非致命警告
    pub warning: Option<String>,
}

impl CopyOutcome {
    fn new(status: CopyStatus) -> Self {
        Self { status, warning: None }
    }
}

/// File service provider trait / 文件服务接口
#[async_trait]
pub trait FileServiceProvider: Send + Sync {
    /// Download a resource into the local cache / 下载资源到本地缓存
    /// Returns None when the object does not exist.
    async fn get_resource(&self, name: &str) -> Result<Option<PathBuf>> {
        self.get_resource_for(name, FileApplicationType::All).await
    }

    async fn get_resource_for(&self, name: &str, app_type: FileApplicationType) -> Result<Option<PathBuf>>;

    /// Upload changed files of a work area / 上传工作区中变更的文件
    async fn add_or_update_resources(&self, work_area: &FileWorkArea, files: &[PathBuf], remove_after: bool) -> Result<()> {
        self.add_or_update_resources_for_paths(work_area, files, remove_after)
            .await
            .map(|_| ())
    }

    /// Same as [`Self::add_or_update_resources`], returning the logical names / 返回逻辑名称
    async fn add_or_update_resources_for_paths(
        &self,
        work_area: &FileWorkArea,
        files: &[PathBuf],
        remove_after: bool,
    ) -> Result<Vec<String>>;

    /// Delete a resource and its cached copy / 删除资源及本地缓存
    async fn remove_resource(&self, name: &str) -> Result<bool>;
}

/// S3-backed file provider / 基于 S3 的文件服务
pub struct S3FileProvider {
    config_service: Arc<S3ConfigurationService>,
    clients: Arc<S3ClientCache>,
    local_cache: Arc<dyn LocalCache>,
    site_context: Arc<dyn SiteContext>,
}

impl S3FileProvider {
    pub fn new(
        config_service: Arc<S3ConfigurationService>,
        clients: Arc<S3ClientCache>,
        local_cache: Arc<dyn LocalCache>,
    ) -> Self {
        Self {
            config_service,
            clients,
            local_cache,
            site_context: Arc::new(RequestSiteContext),
        }
    }

    /// Replace the site resolver (defaults to the task-local request site) / 替换站点解析器
    pub fn with_site_context(mut self, site_context: Arc<dyn SiteContext>) -> Self {
        self.site_context = site_context;
        self
    }

    fn client(&self) -> Result<(Arc<S3Configuration>, ClientHandle)> {
        let config = self.config_service.lookup_configuration()?;
        let client = self
            .clients
            .get_client(&config)
            .map_err(|e| StorageError::configuration(format!("unable to create S3 client: {}", e)))?;
        Ok((config, client))
    }

    fn resource_key(&self, config: &S3Configuration, name: &str) -> String {
        build_resource_name(config, name, self.site_context.current_site())
    }

    /// Upload one object from a stream of known size / 上传单个对象
    pub async fn add_or_update_resource<R>(&self, reader: R, name: &str, size: u64) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let (config, client) = self.client()?;
        let key = self.resource_key(&config, name);

        // Declared size bounds the read, not the allocation
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(usize::MAX).min(READ_BUFFER_HINT));
        let read = reader
            .take(size)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::transfer(format!("Unable to read {}", name), &key, Some(e.into())))?;
        if (read as u64) < size {
            return Err(StorageError::transfer(
                format!("Expected {} bytes for {} but the stream ended after {}", size, name, read),
                &key,
                None,
            ));
        }

        // Body is reference counted, the retry reuses it
        let request = PutObjectRequest::new(&key, Bytes::from(buf)).visibility(config.visibility_for(name));
        match self.put(&config, &client, request.clone()).await {
            Err(e) if e.is_no_such_bucket() => {
                self.create_bucket(&config, &client).await?;
                self.put(&config, &client, request).await?;
            }
            other => other?,
        }

        tracing::trace!("{} copied/updated to {}", name, config.s3_uri(&key));
        Ok(())
    }

    async fn put(&self, config: &S3Configuration, client: &ClientHandle, request: PutObjectRequest) -> Result<()> {
        let key = request.key.clone();
        client
            .put_object(request)
            .await
            .map_err(|e| StorageError::transfer(format!("Unable to upload {}", config.s3_uri(&key)), key, Some(e)))
    }

    async fn create_bucket(&self, config: &S3Configuration, client: &ClientHandle) -> Result<()> {
        tracing::debug!("Bucket {} does not exist, creating it", config.bucket_name());
        client.create_bucket().await.map_err(|e| {
            StorageError::transfer(
                format!("Unable to create bucket {}", config.bucket_name()),
                "",
                Some(e),
            )
        })
    }

    async fn upload_files(
        &self,
        config: &S3Configuration,
        client: &ClientHandle,
        work_area: &FileWorkArea,
        files: &[PathBuf],
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(files.len());

        for file in files {
            let started = Instant::now();
            let name = logical_name(work_area, file)?;
            let key = self.resource_key(config, &name);

            let local_size = tokio::fs::metadata(file)
                .await
                .map_err(|e| {
                    StorageError::transfer(format!("Unable to read {}", file.display()), &key, Some(e.into()))
                        .with_local_path(file)
                })?
                .len();

            let remote_size = match client.head_object(&key).await {
                Ok(meta) => Some(meta.size),
                Err(e) if e.is_not_found() || e.is_no_such_bucket() => None,
                Err(e) => {
                    return Err(StorageError::transfer(
                        format!("Unable to query {}", config.s3_uri(&key)),
                        &key,
                        Some(e),
                    ))
                }
            };
            let queried = started.elapsed();

            if remote_size == Some(local_size) {
                tracing::trace!(
                    "{} already at {} with same filesize = {}bytes; queryTime = {}ms",
                    file.display(),
                    config.s3_uri(&key),
                    local_size,
                    queried.as_millis()
                );
            } else {
                let body = tokio::fs::read(file).await.map_err(|e| {
                    StorageError::transfer(format!("Unable to read {}", file.display()), &key, Some(e.into()))
                        .with_local_path(file)
                })?;
                let request = PutObjectRequest::new(&key, Bytes::from(body)).visibility(config.visibility_for(&name));
                self.put(config, client, request)
                    .await
                    .map_err(|e| e.with_local_path(file))?;

                let total = started.elapsed();
                tracing::trace!(
                    "{} copied/updated to {}; queryTime = {}ms; uploadTime = {}ms; totalTime = {}ms",
                    file.display(),
                    config.s3_uri(&key),
                    queried.as_millis(),
                    (total - queried).as_millis(),
                    total.as_millis()
                );
            }

            names.push(name);
        }

        Ok(names)
    }

    /// Whether an object exists at the raw key / 对象是否存在（原始键）
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let (config, client) = self.client()?;
        match client.head_object(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(StorageError::transfer(
                format!("Unable to query {}", config.s3_uri(key)),
                key,
                Some(e),
            )),
        }
    }

    /// Server-side copy between raw keys / 服务端复制（原始键）
    pub async fn copy_object(&self, src: &str, dest: &str, tolerate_already_moved: bool) -> Result<CopyOutcome> {
        self.copy_or_move(src, dest, false, tolerate_already_moved).await
    }

    /// Copy then delete the source / 移动对象
    pub async fn move_object(&self, src: &str, dest: &str, tolerate_already_moved: bool) -> Result<CopyOutcome> {
        self.copy_or_move(src, dest, true, tolerate_already_moved).await
    }

    async fn copy_or_move(
        &self,
        src: &str,
        dest: &str,
        is_move: bool,
        tolerate_already_moved: bool,
    ) -> Result<CopyOutcome> {
        let (config, client) = self.client()?;

        match client.copy_object(src, dest, config.visibility_for(dest)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() && tolerate_already_moved => {
                return match client.head_object(dest).await {
                    Ok(_) => {
                        tracing::warn!("src({}) doesn't exist but dest({}) does, so assuming success", src, dest);
                        Ok(CopyOutcome::new(CopyStatus::AlreadyAtDestination))
                    }
                    Err(head_err) if head_err.is_not_found() => Err(StorageError::transfer(
                        format!("neither src({}) or dest({}) exist", src, dest),
                        src,
                        Some(e),
                    )),
                    Err(head_err) => Err(StorageError::transfer(
                        format!("src({}) doesn't exist and dest({}) could not be checked", src, dest),
                        src,
                        Some(head_err),
                    )),
                };
            }
            Err(e) => {
                return Err(StorageError::transfer(
                    format!("Unable to copy object from: {} to: {}", src, dest),
                    src,
                    Some(e),
                ))
            }
        }

        let mut outcome = CopyOutcome::new(CopyStatus::Copied);
        if is_move {
            if let Err(e) = client.delete_object(src).await {
                let message = format!("Moving objects to production folder but unable to delete old object: {}", src);
                tracing::error!("{}: {}", message, e);
                outcome.warning = Some(message);
            }
        }

        tracing::trace!("{} {} to {}", if is_move { "moved" } else { "copied" }, config.s3_uri(src), config.s3_uri(dest));
        Ok(outcome)
    }

    /// Delete several raw keys / 批量删除（原始键）
    pub async fn delete_multiple_objects(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let (config, client) = self.client()?;
        let output = client.delete_objects(keys).await.map_err(|e| {
            StorageError::transfer(
                format!("Unable to delete {} objects from {}", keys.len(), config.bucket_name()),
                keys.first().map(String::as_str).unwrap_or_default(),
                Some(e),
            )
        })?;

        if !output.errors.is_empty() {
            for failure in &output.errors {
                tracing::trace!("Object {} failed to delete: {}: {}", failure.key, failure.code, failure.message);
            }
            return Err(StorageError::BatchDelete {
                failed: output.errors.len(),
                errors: output.errors,
            });
        }

        tracing::trace!("Deleted {} objects from {}", output.deleted.len(), config.bucket_name());
        Ok(output.deleted.len())
    }
}

#[async_trait]
impl FileServiceProvider for S3FileProvider {
    async fn get_resource_for(&self, name: &str, app_type: FileApplicationType) -> Result<Option<PathBuf>> {
        let started = Instant::now();
        let (config, client) = self.client()?;
        let key = self.resource_key(&config, name);
        let local_path = self.local_cache.local_path(&key);

        let mut reader = match client.get_object(&key).await {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} not found for {:?} resource {}", config.s3_uri(&key), app_type, name);
                return Ok(None);
            }
            Err(e) => {
                return Err(StorageError::transfer(
                    format!("Unable to download {}", config.s3_uri(&key)),
                    &key,
                    Some(e),
                )
                .with_local_path(&local_path))
            }
        };

        let io_error = |message: &str, e: std::io::Error| {
            StorageError::transfer(message.to_string(), &key, Some(ObjectStoreError::Io(e))).with_local_path(&local_path)
        };

        ensure_parent_dir(&local_path)
            .await
            .map_err(|e| io_error("Unable to create cache directory", e))?;
        let mut file = tokio::fs::File::create(&local_path)
            .await
            .map_err(|e| io_error("Unable to create cache file", e))?;

        let copied = tokio::io::copy(&mut reader, &mut file).await;
        let flushed = file.flush().await;
        let size = match (copied, flushed) {
            (Ok(size), Ok(())) => size,
            (Ok(_), Err(e)) => return Err(io_error("Error closing output stream while writing s3 file to file system", e)),
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    tracing::warn!("Failed to flush {}: {}", local_path.display(), flush_err);
                }
                return Err(io_error("Error writing s3 file to file system", e));
            }
        };

        tracing::trace!(
            "{:?} resource {} downloaded from {} to {} ({} bytes); totalTime = {}ms",
            app_type,
            name,
            config.s3_uri(&key),
            local_path.display(),
            size,
            started.elapsed().as_millis()
        );
        Ok(Some(local_path))
    }

    async fn add_or_update_resources_for_paths(
        &self,
        work_area: &FileWorkArea,
        files: &[PathBuf],
        remove_after: bool,
    ) -> Result<Vec<String>> {
        for file in files {
            if !file.starts_with(&work_area.file_path_location) {
                return Err(StorageError::Scope {
                    path: file.clone(),
                    work_area: work_area.file_path_location.clone(),
                });
            }
        }

        let (config, client) = self.client()?;
        let names = match self.upload_files(&config, &client, work_area, files).await {
            Err(e) if e.is_no_such_bucket() => {
                self.create_bucket(&config, &client).await?;
                self.upload_files(&config, &client, work_area, files).await?
            }
            other => other?,
        };

        if remove_after {
            for file in files {
                match tokio::fs::remove_file(file).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!("Unable to remove {} from work area: {}", file.display(), e),
                }
            }
        }

        Ok(names)
    }

    async fn remove_resource(&self, name: &str) -> Result<bool> {
        let (config, client) = self.client()?;
        let key = self.resource_key(&config, name);

        client.delete_object(&key).await.or_else(|e| {
            if e.is_not_found() {
                Ok(())
            } else {
                Err(StorageError::transfer(
                    format!("Unable to delete {}", config.s3_uri(&key)),
                    &key,
                    Some(e),
                ))
            }
        })?;
        tracing::trace!("deleted {}", config.s3_uri(&key));

        let local_path = self.local_cache.local_path(&key);
        match tokio::fs::remove_file(&local_path).await {
            Ok(()) => tracing::trace!("deleted {}", local_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Unable to delete cached file {}: {}", local_path.display(), e),
        }

        Ok(true)
    }
}

/// `/` + path relative to the work area, `/` separated / 相对工作区的逻辑名称
fn logical_name(work_area: &FileWorkArea, file: &Path) -> Result<String> {
    let relative = file
        .strip_prefix(&work_area.file_path_location)
        .map_err(|_| StorageError::Scope {
            path: file.to_path_buf(),
            work_area: work_area.file_path_location.clone(),
        })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(format!("/{}", parts.join("/")))
}

async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if let Err(e) = tokio::fs::create_dir_all(parent).await {
        // A concurrent download may have created it; anything but a directory is still an error
        let is_dir = tokio::fs::metadata(parent).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return Err(e);
        }
    }
    Ok(())
}
