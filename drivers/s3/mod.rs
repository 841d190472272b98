//! S3 compatible object storage driver / S3对象存储驱动

pub mod client;
pub mod config;
pub mod driver;
pub mod factory;
pub mod stream;

pub use client::{ByteRange, ObjectClient, ObjectHeaders, RustS3Client};
pub use config::S3Setting;
pub use driver::{encode_tags, object_path, S3Connection};
pub use factory::{S3Driver, DRIVER_TYPE};
pub use stream::TempStream;

use crate::storage::StorageManager;

/// Register the S3 driver under "s3" / 注册S3驱动
pub fn register(manager: &StorageManager) {
    manager.register_driver(Box::new(S3Driver));
}
