//! S3驱动核心实现
//!
//! 设计原则：
//! - 只提供原语（get, head, put, copy, delete, create_bucket）
//! - 一个客户端绑定一个存储桶
//! - 非2xx响应按S3错误码分类（NoSuchKey / NoSuchBucket）

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::serde_types::{DeleteObjectsResult, ObjectIdentifier};
use s3::Region;

use super::response::check_status;
use crate::config::S3Configuration;
use crate::error::ObjectStoreError;
use crate::storage::{
    DeleteFailure, DeleteObjectsOutput, ObjectMeta, ObjectReader, ObjectStorage, PutObjectRequest, Visibility,
};

/// S3对象存储客户端
pub struct S3ObjectStorage {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
}

impl S3ObjectStorage {
    /// 根据配置创建S3客户端
    pub fn new(config: &S3Configuration) -> Result<Self> {
        let credentials = Credentials::new(
            Some(config.access_key_id()),
            Some(config.secret_key()),
            None,
            None,
            None,
        )
        .map_err(|e| anyhow!("创建S3凭证失败: {}", e))?;

        let region = match config.endpoint() {
            Some(endpoint) => Region::Custom {
                region: config.region().to_string(),
                endpoint: endpoint.to_string(),
            },
            None => Region::Custom {
                region: config.region().to_string(),
                endpoint: format!("https://s3.{}.amazonaws.com", config.region()),
            },
        };

        let bucket = Bucket::new(config.bucket_name(), region.clone(), credentials.clone())
            .map_err(|e| anyhow!("创建S3 Bucket失败: {}", e))?;

        // MinIO等自建服务需要路径风格
        let bucket = if Self::needs_path_style(config.endpoint()) {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            region,
            credentials,
        })
    }

    fn needs_path_style(endpoint: Option<&str>) -> bool {
        endpoint.is_some_and(|e| !e.contains(".amazonaws.com"))
    }

    /// 按可见性设置ACL头（每个请求单独克隆）
    fn bucket_for(&self, visibility: Visibility) -> Bucket {
        let mut bucket = (*self.bucket).clone();
        if let Some(acl) = visibility.canned_acl() {
            bucket.add_header("x-amz-acl", acl);
        }
        bucket
    }

    fn map_error(&self, err: S3Error, key: &str) -> ObjectStoreError {
        match err {
            S3Error::HttpFailWithBody(status, body) => check_status(status, body.as_bytes(), self.bucket_name(), key)
                .err()
                .unwrap_or_else(|| ObjectStoreError::Transport(format!("unexpected status {}", status))),
            other => ObjectStoreError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    async fn get_object(&self, key: &str) -> Result<ObjectReader, ObjectStoreError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| self.map_error(e, key))?;
        check_status(response.status_code(), response.bytes(), self.bucket_name(), key)?;

        // rust-s3返回完整响应，封装为AsyncRead
        let data = response.bytes().to_vec();
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError> {
        let (head, code) = self
            .bucket
            .head_object(key)
            .await
            .map_err(|e| self.map_error(e, key))?;
        check_status(code, b"", self.bucket_name(), key)?;

        Ok(ObjectMeta {
            size: head.content_length.unwrap_or(0).max(0) as u64,
            content_type: head.content_type,
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<(), ObjectStoreError> {
        let content_type = request.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&request.key)
                .first_or_octet_stream()
                .to_string()
        });

        let bucket = self.bucket_for(request.visibility);
        let response = bucket
            .put_object_with_content_type(&request.key, &request.body, &content_type)
            .await
            .map_err(|e| self.map_error(e, &request.key))?;
        check_status(response.status_code(), response.bytes(), self.bucket_name(), &request.key)
    }

    async fn copy_object(&self, src: &str, dest: &str, visibility: Visibility) -> Result<(), ObjectStoreError> {
        // copy_object_internal的from参数需要URL编码（中文等非ASCII字符）
        let encoded_src = urlencoding::encode(src);
        tracing::debug!("S3 CopyObject: src_key={}, encoded={}, dst_key={}", src, encoded_src, dest);

        let bucket = self.bucket_for(visibility);
        let code = bucket
            .copy_object_internal(&*encoded_src, dest)
            .await
            .map_err(|e| self.map_error(e, src))?;
        check_status(code, b"", self.bucket_name(), src)?;

        // CopyObject可能返回200但响应体是<Error>，验证新文件是否存在
        let (_, head_code) = self
            .bucket
            .head_object(dest)
            .await
            .map_err(|e| self.map_error(e, dest))?;
        verify_copy(code, head_code, dest)
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| self.map_error(e, key))?;
        match check_status(response.status_code(), response.bytes(), self.bucket_name(), key) {
            Err(ObjectStoreError::NoSuchKey { .. }) => Ok(()),
            other => other,
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteObjectsOutput, ObjectStoreError> {
        let objects: Vec<ObjectIdentifier> = keys.iter().map(|k| ObjectIdentifier::new(k.as_str())).collect();
        let result = self
            .bucket
            .delete_objects(objects)
            .await
            .map_err(|e| self.map_error(e, ""))?;
        Ok(delete_output(result))
    }

    async fn create_bucket(&self) -> Result<(), ObjectStoreError> {
        let name = self.bucket_name().to_string();
        let create = if Self::needs_path_style(Some(self.region.endpoint().as_str())) {
            Bucket::create_with_path_style(&name, self.region.clone(), self.credentials.clone(), BucketConfiguration::default())
                .await
        } else {
            Bucket::create(&name, self.region.clone(), self.credentials.clone(), BucketConfiguration::default()).await
        };
        let response = create.map_err(|e| self.map_error(e, ""))?;

        match check_status(response.response_code, response.response_text.as_bytes(), &name, "") {
            Err(ObjectStoreError::Service { code, .. }) if code == "BucketAlreadyOwnedByYou" => Ok(()),
            other => {
                if other.is_ok() {
                    tracing::info!("S3 bucket created: {}", name);
                }
                other
            }
        }
    }
}

/// HEAD状态码校验复制结果（错误沿用复制请求的状态码，不会被当作源文件不存在）
fn verify_copy(copy_code: u16, head_code: u16, dest: &str) -> Result<(), ObjectStoreError> {
    if (200..300).contains(&head_code) {
        Ok(())
    } else {
        Err(ObjectStoreError::Service {
            status: copy_code,
            code: "CopyNotVerified".to_string(),
            message: format!("CopyObject succeeded but {} is not readable (HEAD returned {})", dest, head_code),
        })
    }
}

/// DeleteObjects响应转换为批量删除结果
fn delete_output(result: DeleteObjectsResult) -> DeleteObjectsOutput {
    DeleteObjectsOutput {
        deleted: result.deleted.into_iter().map(|d| d.key).collect(),
        errors: result
            .errors
            .into_iter()
            .map(|e| DeleteFailure {
                key: e.key,
                code: e.code,
                message: e.message,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> S3Configuration {
        let mut builder = S3Configuration::builder()
            .secret_key("secret")
            .access_key_id("AKIDEXAMPLE")
            .bucket_name("assets")
            .region("us-west-2");
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(endpoint);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_client_binds_bucket() {
        let client = S3ObjectStorage::new(&config(None)).unwrap();
        assert_eq!(client.bucket_name(), "assets");
        assert_eq!(client.region.endpoint(), "https://s3.us-west-2.amazonaws.com");
    }

    #[test]
    fn test_client_uses_fixed_up_endpoint() {
        let client = S3ObjectStorage::new(&config(Some("https://s3.amazonaws.com"))).unwrap();
        assert_eq!(client.region.endpoint(), "https://s3-us-west-2.amazonaws.com");
    }

    #[test]
    fn test_path_style_for_custom_endpoints() {
        assert!(S3ObjectStorage::needs_path_style(Some("http://localhost:9000")));
        assert!(!S3ObjectStorage::needs_path_style(Some("https://s3-us-west-2.amazonaws.com")));
        assert!(!S3ObjectStorage::needs_path_style(None));
    }

    #[test]
    fn test_delete_output_keeps_per_key_errors() {
        use s3::serde_types::{DeleteError, DeletedObject};

        let result = DeleteObjectsResult {
            deleted: vec![DeletedObject {
                key: "a.png".to_string(),
                version_id: None,
                delete_marker: None,
                delete_marker_version_id: None,
            }],
            errors: vec![DeleteError {
                key: "b.png".to_string(),
                code: "AccessDenied".to_string(),
                message: "Access Denied".to_string(),
                version_id: None,
            }],
        };

        let output = delete_output(result);
        assert_eq!(output.deleted, vec!["a.png".to_string()]);
        assert_eq!(
            output.errors,
            vec![DeleteFailure {
                key: "b.png".to_string(),
                code: "AccessDenied".to_string(),
                message: "Access Denied".to_string(),
            }]
        );
    }

    #[test]
    fn test_copy_verified_by_head() {
        assert!(verify_copy(200, 200, "prod/a.png").is_ok());

        let err = verify_copy(200, 404, "prod/a.png").unwrap_err();
        assert!(!err.is_not_found());
        match err {
            ObjectStoreError::Service { status, code, message } => {
                assert_eq!(status, 200);
                assert_eq!(code, "CopyNotVerified");
                assert!(message.contains("prod/a.png"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
