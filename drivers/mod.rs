// Object storage backends / 对象存储后端
pub mod s3;
pub mod memory;
