//! System property sources / 系统属性来源
//!
//! The configuration service reads its settings by name from a `PropertySource`.
//! Hosts plug in whatever backs their system properties; three sources ship here.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

/// Key/value property lookup / 属性查询接口
pub trait PropertySource: Send + Sync {
    /// Resolve a property by name, None if not set / 按名称解析属性
    fn resolve_property(&self, name: &str) -> Option<String>;
}

/// In-memory properties / 内存属性
#[derive(Debug, Clone, Default)]
pub struct MapProperties {
    values: HashMap<String, String>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }
}

impl PropertySource for MapProperties {
    fn resolve_property(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl From<HashMap<String, String>> for MapProperties {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

/// Environment variable properties / 环境变量属性
/// `aws.s3.secretKey` is read from `AWS_S3_SECRETKEY` (optionally prefixed)
#[derive(Debug, Clone, Default)]
pub struct EnvProperties {
    prefix: String,
}

impl EnvProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix prepended to every variable name, e.g. "SHOP_" / 变量名前缀
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn variable_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.replace(['.', '-'], "_").to_uppercase())
    }
}

impl PropertySource for EnvProperties {
    fn resolve_property(&self, name: &str) -> Option<String> {
        std::env::var(self.variable_name(name)).ok()
    }
}

/// Properties loaded from a flat JSON object file / 从 JSON 文件加载的属性
#[derive(Debug, Clone, Default)]
pub struct JsonFileProperties {
    values: HashMap<String, String>,
}

impl JsonFileProperties {
    /// Load from file / 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read properties file {:?}", path))?;
        let props = Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse properties file {:?}", path))?;
        tracing::debug!("Loaded {} properties from {:?}", props.values.len(), path);
        Ok(props)
    }

    /// Parse from a JSON string / 从 JSON 字符串解析
    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        let object = value
            .as_object()
            .ok_or_else(|| anyhow!("properties must be a JSON object"))?;

        let mut values = HashMap::new();
        for (name, value) in object {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(anyhow!("property {} must be a scalar value", name));
                }
            };
            values.insert(name.clone(), value);
        }
        Ok(Self { values })
    }
}

impl PropertySource for JsonFileProperties {
    fn resolve_property(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_properties() {
        let props = MapProperties::new().with("aws.s3.defaultBucketName", "assets");
        assert_eq!(props.resolve_property("aws.s3.defaultBucketName").as_deref(), Some("assets"));
        assert_eq!(props.resolve_property("aws.s3.secretKey"), None);
    }

    #[test]
    fn test_env_variable_name() {
        assert_eq!(EnvProperties::new().variable_name("aws.s3.secretKey"), "AWS_S3_SECRETKEY");
        assert_eq!(
            EnvProperties::with_prefix("SHOP_").variable_name("aws.s3.endpointURI"),
            "SHOP_AWS_S3_ENDPOINTURI"
        );
    }

    #[test]
    fn test_json_scalars() {
        let props = JsonFileProperties::from_json_str(
            r#"{"aws.s3.defaultBucketName": "assets", "retries": 3, "enabled": true, "unset": null}"#,
        )
        .unwrap();
        assert_eq!(props.resolve_property("aws.s3.defaultBucketName").as_deref(), Some("assets"));
        assert_eq!(props.resolve_property("retries").as_deref(), Some("3"));
        assert_eq!(props.resolve_property("enabled").as_deref(), Some("true"));
        assert_eq!(props.resolve_property("unset"), None);
    }

    #[test]
    fn test_json_rejects_nested_values() {
        assert!(JsonFileProperties::from_json_str(r#"{"a": {"b": 1}}"#).is_err());
        assert!(JsonFileProperties::from_json_str("[1, 2]").is_err());
    }

    #[test]
    fn test_json_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"aws.s3.defaultBucketRegion": "us-west-2"}}"#).unwrap();

        let props = JsonFileProperties::load(file.path()).unwrap();
        assert_eq!(props.resolve_property("aws.s3.defaultBucketRegion").as_deref(), Some("us-west-2"));
        assert!(JsonFileProperties::load(file.path().with_extension("missing")).is_err());
    }
}
