//! S3驱动工厂

use std::sync::Arc;

use super::config::S3Setting;
use super::driver::S3Connection;
use crate::storage::{ConfigItem, Connection, Driver, Instance, Result};

pub const DRIVER_TYPE: &str = "s3";

/// S3驱动工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Driver;

impl Driver for S3Driver {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    fn connect(&self, instance: Arc<Instance>) -> Result<Box<dyn Connection>> {
        let setting = S3Setting::from_setting(&instance.setting);
        tracing::debug!("S3 connect: instance={}, setting={:?}", instance.name, setting);
        Ok(Box::new(S3Connection::new(instance, setting)))
    }

    fn additional_items(&self) -> Vec<ConfigItem> {
        vec![
            ConfigItem::new("bucket", "string")
                .title("存储桶名称")
                .default("default"),
            ConfigItem::new("region", "string")
                .title("区域")
                .help("S3区域，如 us-east-1、cn-hangzhou")
                .default("us-east-1"),
            ConfigItem::new("endpoint", "string")
                .title("端点地址")
                .help("Custom endpoint, https:// is added when no scheme is given"),
            ConfigItem::new("access_key", "string")
                .title("Access Key ID")
                .help("Also accepted as 'access' or 'accesskey'"),
            ConfigItem::new("secret_key", "password")
                .title("Secret Access Key")
                .help("Also accepted as 'secret' or 'secretkey'"),
            ConfigItem::new("session_token", "password")
                .title("Session Token")
                .help("临时凭证的会话令牌（可选）"),
            ConfigItem::new("force_path_style", "bool")
                .title("强制路径风格")
                .help("MinIO等需要开启此选项，也可使用 path_style")
                .default("false"),
            ConfigItem::new("temp_dir", "string")
                .title("临时目录")
                .help("Directory for fetch temp files"),
            ConfigItem::new("download_part_size", "number")
                .title("下载分片大小")
                .default("8388608"),
            ConfigItem::new("download_concurrency", "number")
                .title("下载并发数")
                .default("4"),
        ]
    }
}
