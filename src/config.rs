//! Amazon S3 connection configuration / S3 连接配置
//!
//! `S3Configuration` is immutable and only produced by `S3ConfigurationBuilder::build`,
//! which validates every field and applies the endpoint region fix-up exactly once.
//! 配置只能通过构建器生成，构建时统一校验并修正端点

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use regex::Regex;

use crate::error::{Result, StorageError};
use crate::storage::Visibility;
use crate::utils::get_ext;

/// Property key: secret access key / 属性键
pub const SECRET_KEY: &str = "aws.s3.secretKey";
/// Property key: access key id
pub const ACCESS_KEY_ID: &str = "aws.s3.accessKeyId";
/// Property key: default bucket name
pub const DEFAULT_BUCKET_NAME: &str = "aws.s3.defaultBucketName";
/// Property key: default bucket region
pub const DEFAULT_BUCKET_REGION: &str = "aws.s3.defaultBucketRegion";
/// Property key: endpoint URI
pub const ENDPOINT_URI: &str = "aws.s3.endpointURI";
/// Property key: bucket sub-directory
pub const BUCKET_SUB_DIRECTORY: &str = "aws.s3.bucketSubDirectory";
/// Property key: regex selecting public-read extensions
pub const STATIC_ASSET_FILE_EXTENSION_PATTERN: &str = "aws.s3.staticAssetFileExtensionPattern";
/// Property key: version sub-directory
pub const VERSION_SUB_DIRECTORY: &str = "aws.s3.versionSubDirectory";

/// Generic (non-regional) S3 endpoint suffix / 通用 S3 端点后缀
const GENERIC_ENDPOINT_SUFFIX: &str = "s3.amazonaws.com";
const AMAZONAWS_DOMAIN: &str = ".amazonaws.com";

/// Region codes accepted for the default bucket / 支持的区域代码
const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "ca-central-1",
    "ca-west-1",
    "mx-central-1",
    "sa-east-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-southeast-5",
    "ap-southeast-7",
    "cn-north-1",
    "cn-northwest-1",
];

/// A validated AWS region code / 已校验的区域代码
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketRegion(String);

impl BucketRegion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BucketRegion {
    type Err = StorageError;

    // Codes must match exactly, `US-WEST-2` or padded values are rejected
    fn from_str(s: &str) -> Result<Self> {
        if KNOWN_REGIONS.contains(&s) {
            Ok(BucketRegion(s.to_string()))
        } else {
            Err(StorageError::configuration(format!(
                "{} was set to an invalid value of {}",
                DEFAULT_BUCKET_REGION, s
            )))
        }
    }
}

impl fmt::Display for BucketRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for connecting to Amazon S3 / S3 连接配置
#[derive(Debug, Clone)]
pub struct S3Configuration {
    secret_key: String,
    access_key_id: String,
    bucket_name: String,
    region: BucketRegion,
    endpoint: Option<String>,
    bucket_sub_directory: Option<String>,
    version_sub_directory: Option<String>,
    static_asset_pattern: Option<Regex>,
}

impl S3Configuration {
    pub fn builder() -> S3ConfigurationBuilder {
        S3ConfigurationBuilder::default()
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn region(&self) -> &BucketRegion {
        &self.region
    }

    /// Endpoint after the region fix-up / 修正后的端点
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn bucket_sub_directory(&self) -> Option<&str> {
        self.bucket_sub_directory.as_deref()
    }

    pub fn version_sub_directory(&self) -> Option<&str> {
        self.version_sub_directory.as_deref()
    }

    pub fn static_asset_pattern(&self) -> Option<&Regex> {
        self.static_asset_pattern.as_ref()
    }

    /// Canned visibility for an object name / 根据扩展名决定可见性
    /// Public-read only when a pattern is configured and matches the lowercased extension
    pub fn visibility_for(&self, name: &str) -> Visibility {
        match (&self.static_asset_pattern, get_ext(name)) {
            (Some(pattern), Some(ext)) if pattern.is_match(&ext) => Visibility::PublicRead,
            _ => Visibility::Default,
        }
    }

    /// `s3://bucket/key` form used in logs and errors / 日志用 URI
    pub fn s3_uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket_name, key)
    }
}

// Identity used for client caching: version directory and pattern are not part of it.
impl PartialEq for S3Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.secret_key == other.secret_key
            && self.bucket_name == other.bucket_name
            && self.region == other.region
            && self.access_key_id == other.access_key_id
            && self.endpoint == other.endpoint
            && self.bucket_sub_directory == other.bucket_sub_directory
    }
}

impl Eq for S3Configuration {}

impl Hash for S3Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.secret_key.hash(state);
        self.bucket_name.hash(state);
        self.region.hash(state);
        self.access_key_id.hash(state);
        self.endpoint.hash(state);
        self.bucket_sub_directory.hash(state);
    }
}

/// Builder for `S3Configuration` / 配置构建器
/// Setters only record raw values; all checks happen in `build` / 设置器只记录原始值
#[derive(Debug, Clone, Default)]
pub struct S3ConfigurationBuilder {
    secret_key: Option<String>,
    access_key_id: Option<String>,
    bucket_name: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    bucket_sub_directory: Option<String>,
    version_sub_directory: Option<String>,
    static_asset_pattern: Option<String>,
}

impl S3ConfigurationBuilder {
    pub fn secret_key(mut self, val: impl Into<String>) -> Self {
        self.secret_key = Some(val.into());
        self
    }

    pub fn access_key_id(mut self, val: impl Into<String>) -> Self {
        self.access_key_id = Some(val.into());
        self
    }

    pub fn bucket_name(mut self, val: impl Into<String>) -> Self {
        self.bucket_name = Some(val.into());
        self
    }

    pub fn region(mut self, val: impl Into<String>) -> Self {
        self.region = Some(val.into());
        self
    }

    pub fn endpoint(mut self, val: impl Into<String>) -> Self {
        self.endpoint = Some(val.into());
        self
    }

    pub fn bucket_sub_directory(mut self, val: impl Into<String>) -> Self {
        self.bucket_sub_directory = Some(val.into());
        self
    }

    pub fn version_sub_directory(mut self, val: impl Into<String>) -> Self {
        self.version_sub_directory = Some(val.into());
        self
    }

    pub fn static_asset_file_extension_pattern(mut self, val: impl Into<String>) -> Self {
        self.static_asset_pattern = Some(val.into());
        self
    }

    /// Validate and build; every violation is reported at once / 校验并构建，一次报告全部问题
    pub fn build(self) -> Result<S3Configuration> {
        let mut violations = Vec::new();

        let secret_key = non_blank(self.secret_key);
        if secret_key.is_none() {
            violations.push(format!("{} was blank", SECRET_KEY));
        }

        let access_key_id = non_blank(self.access_key_id);
        if access_key_id.is_none() {
            violations.push(format!("{} was blank", ACCESS_KEY_ID));
        }

        let bucket_name = non_blank(self.bucket_name);
        if bucket_name.is_none() {
            violations.push(format!("{} was blank", DEFAULT_BUCKET_NAME));
        }

        let region = match self.region.as_deref().map(BucketRegion::from_str) {
            Some(Ok(region)) => Some(region),
            Some(Err(StorageError::Configuration { violations: mut region_violations })) => {
                violations.append(&mut region_violations);
                None
            }
            Some(Err(e)) => {
                violations.push(e.to_string());
                None
            }
            None => {
                violations.push(format!("{} was set to an invalid value of null", DEFAULT_BUCKET_REGION));
                None
            }
        };

        let static_asset_pattern = match non_blank(self.static_asset_pattern) {
            Some(raw) => match Regex::new(&format!("^(?:{})$", raw)) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    violations.push(format!(
                        "{} is not a valid pattern: {}",
                        STATIC_ASSET_FILE_EXTENSION_PATTERN, e
                    ));
                    None
                }
            },
            None => None,
        };

        match (secret_key, access_key_id, bucket_name, region) {
            (Some(secret_key), Some(access_key_id), Some(bucket_name), Some(region))
                if violations.is_empty() =>
            {
                let endpoint = non_blank(self.endpoint).map(|e| fixup_endpoint(e, &region));
                Ok(S3Configuration {
                    secret_key,
                    access_key_id,
                    bucket_name,
                    region,
                    endpoint,
                    bucket_sub_directory: non_blank(self.bucket_sub_directory),
                    version_sub_directory: non_blank(self.version_sub_directory),
                    static_asset_pattern,
                })
            }
            _ => Err(StorageError::Configuration { violations }),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Insert the region into a generic S3 endpoint / 将区域插入通用端点
/// "https://s3.amazonaws.com" + us-west-2 -> "https://s3-us-west-2.amazonaws.com"
/// Plain string matching on the literal suffix, not host parsing.
pub fn fixup_endpoint(endpoint: String, region: &BucketRegion) -> String {
    if !endpoint.ends_with(GENERIC_ENDPOINT_SUFFIX) {
        return endpoint;
    }
    match endpoint.rfind(AMAZONAWS_DOMAIN) {
        Some(loc) if loc > 0 => format!("{}-{}.{}", &endpoint[..loc], region, &endpoint[loc + 1..]),
        _ => endpoint,
    }
}
