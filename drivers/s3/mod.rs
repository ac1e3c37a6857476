//! S3对象存储驱动 / S3 object storage backend (rust-s3)

mod driver;
mod factory;
mod response;

pub use driver::S3ObjectStorage;
pub use factory::S3ClientFactory;
