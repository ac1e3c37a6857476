//! S3响应状态解析 / S3 response classification

use serde::Deserialize;

use crate::error::ObjectStoreError;

/// S3 XML error body / S3 错误响应体
/// `<Error><Code>NoSuchKey</Code><Message>...</Message></Error>`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// 解析错误码和错误信息
fn parse_error_body(body: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(body).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    quick_xml::de::from_str::<ErrorBody>(text)
        .ok()
        .map(|e| (e.code, e.message))
}

/// Map an HTTP status and body onto an error (Ok for 2xx) / 将状态码映射为错误
/// A bodiless 404 (HEAD, copy) is treated as a missing key.
pub(crate) fn check_status(status: u16, body: &[u8], bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    match parse_error_body(body) {
        Some((code, _)) if code == "NoSuchKey" => Err(ObjectStoreError::NoSuchKey { key: key.to_string() }),
        Some((code, _)) if code == "NoSuchBucket" => Err(ObjectStoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        }),
        Some((code, message)) => Err(ObjectStoreError::Service { status, code, message }),
        None if status == 404 => Err(ObjectStoreError::NoSuchKey { key: key.to_string() }),
        None => Err(ObjectStoreError::Service {
            status,
            code: format!("Http{}", status),
            message: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message><Key>img/a.png</Key></Error>"#;

    const NO_SUCH_BUCKET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist</Message><BucketName>assets</BucketName></Error>"#;

    const ACCESS_DENIED: &str = r#"<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#;

    #[test]
    fn test_success_statuses() {
        assert!(check_status(200, b"", "assets", "k").is_ok());
        assert!(check_status(204, b"", "assets", "k").is_ok());
    }

    #[test]
    fn test_no_such_key() {
        let err = check_status(404, NO_SUCH_KEY.as_bytes(), "assets", "img/a.png").unwrap_err();
        assert!(matches!(err, ObjectStoreError::NoSuchKey { ref key } if key == "img/a.png"));
    }

    #[test]
    fn test_no_such_bucket() {
        let err = check_status(404, NO_SUCH_BUCKET.as_bytes(), "assets", "img/a.png").unwrap_err();
        assert!(err.is_no_such_bucket());
    }

    #[test]
    fn test_bodiless_404_is_missing_key() {
        assert!(check_status(404, b"", "assets", "k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_other_service_errors() {
        match check_status(403, ACCESS_DENIED.as_bytes(), "assets", "k").unwrap_err() {
            ObjectStoreError::Service { status, code, message } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "Access Denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        match check_status(500, b"oops", "assets", "k").unwrap_err() {
            ObjectStoreError::Service { code, .. } => assert_eq!(code, "Http500"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
