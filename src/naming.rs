//! Resource naming / 资源命名
//!
//! Storage key layout: `<sub-directory>/<version-directory>/<site-N>/<logical-path>`,
//! empty segments omitted. 存储键布局，空段省略

use std::future::Future;

use crate::config::S3Configuration;
use crate::utils::join_key;

tokio::task_local! {
    static CURRENT_SITE: u64;
}

/// Request-scoped site resolver / 请求级站点解析
pub trait SiteContext: Send + Sync {
    /// Id of the site active for the current request, if any / 当前站点 ID
    fn current_site(&self) -> Option<u64>;
}

/// Site taken from a tokio task-local scope / 从任务本地作用域获取站点
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSiteContext;

impl RequestSiteContext {
    /// Run a future with `site_id` as the active site / 在指定站点作用域内执行
    pub async fn scope<F: Future>(site_id: u64, f: F) -> F::Output {
        CURRENT_SITE.scope(site_id, f).await
    }
}

impl SiteContext for RequestSiteContext {
    fn current_site(&self) -> Option<u64> {
        CURRENT_SITE.try_with(|id| *id).ok()
    }
}

/// Fixed site, mainly for single-site hosts / 固定站点
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSite(pub Option<u64>);

impl SiteContext for FixedSite {
    fn current_site(&self) -> Option<u64> {
        self.0
    }
}

/// Directory holding one site's resources / 站点目录
pub fn site_directory(site_id: u64) -> String {
    format!("site-{}", site_id)
}

/// Build the storage key for a logical resource name / 生成资源的存储键
pub fn build_resource_name(config: &S3Configuration, name: &str, site: Option<u64>) -> String {
    // Strip the starting slash to prevent empty directories in S3
    let name = name.strip_prefix('/').unwrap_or(name);

    let mut base_directory = config.bucket_sub_directory().unwrap_or("").to_string();
    if let Some(version) = config.version_sub_directory() {
        base_directory = join_key(&base_directory, version);
    }

    join_key(&base_directory, &site_specific_resource_name(name, site))
}

fn site_specific_resource_name(name: &str, site: Option<u64>) -> String {
    match site {
        Some(site_id) => join_key(&site_directory(site_id), name.trim_start_matches('/')),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3ConfigurationBuilder;

    fn builder() -> S3ConfigurationBuilder {
        S3Configuration::builder()
            .secret_key("secret")
            .access_key_id("AKIDEXAMPLE")
            .bucket_name("assets")
            .region("us-east-1")
    }

    #[test]
    fn test_sub_and_version_directories() {
        let config = builder()
            .bucket_sub_directory("assets")
            .version_sub_directory("v2")
            .build()
            .unwrap();
        assert_eq!(build_resource_name(&config, "/img/a.png", None), "assets/v2/img/a.png");
    }

    #[test]
    fn test_no_directories() {
        let config = builder().build().unwrap();
        assert_eq!(build_resource_name(&config, "/img/a.png", None), "img/a.png");
        assert_eq!(build_resource_name(&config, "img/a.png", None), "img/a.png");
    }

    #[test]
    fn test_leading_slash_on_sub_directory() {
        let config = builder().bucket_sub_directory("/shop/").build().unwrap();
        assert_eq!(build_resource_name(&config, "//css/site.css", None), "shop/css/site.css");
    }

    #[test]
    fn test_site_directory() {
        let config = builder()
            .bucket_sub_directory("shop")
            .version_sub_directory("v2")
            .build()
            .unwrap();
        assert_eq!(build_resource_name(&config, "/img/a.png", Some(7)), "shop/v2/site-7/img/a.png");
        assert_eq!(build_resource_name(&config, "img/a.png", Some(7)), "shop/v2/site-7/img/a.png");
    }

    #[test]
    fn test_version_without_sub_directory() {
        let config = builder().version_sub_directory("v3").build().unwrap();
        assert_eq!(build_resource_name(&config, "/a.css", Some(1)), "v3/site-1/a.css");
    }

    #[tokio::test]
    async fn test_request_site_context_scope() {
        let ctx = RequestSiteContext;
        assert_eq!(ctx.current_site(), None);

        let inside = RequestSiteContext::scope(42, async move { ctx.current_site() }).await;
        assert_eq!(inside, Some(42));
        assert_eq!(ctx.current_site(), None);
    }

    #[test]
    fn test_fixed_site() {
        assert_eq!(FixedSite(Some(3)).current_site(), Some(3));
        assert_eq!(FixedSite::default().current_site(), None);
    }
}
