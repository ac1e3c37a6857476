//! Error types / 错误类型

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::DeleteFailure;

/// Errors reported by an object storage backend / 对象存储后端错误
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("NoSuchKey: {key}")]
    NoSuchKey { key: String },

    #[error("NoSuchBucket: {bucket}")]
    NoSuchBucket { bucket: String },

    #[error("{code} (status {status}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectStoreError {
    /// Object is missing (NoSuchKey or a bare 404) / 对象不存在
    pub fn is_not_found(&self) -> bool {
        match self {
            ObjectStoreError::NoSuchKey { .. } => true,
            ObjectStoreError::Service { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Bucket itself is missing / 存储桶不存在
    pub fn is_no_such_bucket(&self) -> bool {
        matches!(self, ObjectStoreError::NoSuchBucket { .. })
    }
}

/// File provider errors / 文件服务错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Amazon S3 Configuration Error : {}", .violations.join(", "))]
    Configuration { violations: Vec<String> },

    #[error("Attempt to update file {} that is not in the passed in WorkArea {}", .path.display(), .work_area.display())]
    Scope { path: PathBuf, work_area: PathBuf },

    #[error("{message}")]
    Transfer {
        message: String,
        key: String,
        local_path: Option<PathBuf>,
        #[source]
        source: Option<ObjectStoreError>,
    },

    #[error("No. of objects failed to delete = {failed}")]
    BatchDelete {
        failed: usize,
        errors: Vec<DeleteFailure>,
    },
}

impl StorageError {
    pub(crate) fn configuration(violation: impl Into<String>) -> Self {
        StorageError::Configuration {
            violations: vec![violation.into()],
        }
    }

    pub(crate) fn transfer(
        message: impl Into<String>,
        key: impl Into<String>,
        source: Option<ObjectStoreError>,
    ) -> Self {
        StorageError::Transfer {
            message: message.into(),
            key: key.into(),
            local_path: None,
            source,
        }
    }

    pub(crate) fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        if let StorageError::Transfer { local_path, .. } = &mut self {
            *local_path = Some(path.into());
        }
        self
    }

    /// Whether the underlying store reported a missing bucket / 是否为存储桶不存在
    pub fn is_no_such_bucket(&self) -> bool {
        matches!(
            self,
            StorageError::Transfer { source: Some(source), .. } if source.is_no_such_bucket()
        )
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message_lists_every_violation() {
        let err = StorageError::Configuration {
            violations: vec![
                "aws.s3.secretKey was blank".to_string(),
                "aws.s3.defaultBucketName was blank".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Amazon S3 Configuration Error : aws.s3.secretKey was blank, aws.s3.defaultBucketName was blank"
        );
    }

    #[test]
    fn test_no_such_bucket_detection() {
        let err = StorageError::transfer(
            "upload failed",
            "a.png",
            Some(ObjectStoreError::NoSuchBucket { bucket: "assets".into() }),
        );
        assert!(err.is_no_such_bucket());

        let err = StorageError::transfer("upload failed", "a.png", None);
        assert!(!err.is_no_such_bucket());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ObjectStoreError::NoSuchKey { key: "k".into() }.is_not_found());
        assert!(ObjectStoreError::Service { status: 404, code: "NotFound".into(), message: String::new() }.is_not_found());
        assert!(!ObjectStoreError::Transport("reset".into()).is_not_found());
    }
}
