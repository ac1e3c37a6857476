pub mod config;
pub mod config_service;
pub mod error;
pub mod naming;
pub mod properties;
pub mod provider;
pub mod storage;
pub mod utils;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use config::{BucketRegion, S3Configuration, S3ConfigurationBuilder};
pub use config_service::S3ConfigurationService;
pub use error::{ObjectStoreError, Result, StorageError};
pub use naming::{FixedSite, RequestSiteContext, SiteContext};
pub use properties::{EnvProperties, JsonFileProperties, MapProperties, PropertySource};
pub use provider::{CopyOutcome, CopyStatus, FileApplicationType, FileServiceProvider, FileWorkArea, S3FileProvider};
pub use storage::{DirectoryCache, LocalCache, ObjectStorage, S3ClientCache, Visibility};
