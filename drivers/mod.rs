// Driver package / 驱动包
pub mod s3;

use crate::storage::StorageManager;

/// Register all drivers to StorageManager / 注册所有驱动
pub fn register_all(manager: &StorageManager) {
    // Register S3 driver / 注册S3对象存储驱动
    s3::register(manager);
}
