//! S3驱动配置
//!
//! Settings arrive as a loosely-typed JSON map and are normalized once into
//! [`S3Setting`]; missing or mistyped keys fall back to defaults, nothing fails here.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BUCKET: &str = "default";
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024; // 8MB per ranged GET
pub const DEFAULT_CONCURRENCY: usize = 4;

/// S3配置
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct S3Setting {
    pub region: String,
    /// 存储桶名称，归一化后不会为空
    pub bucket: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    /// Session Token（用于临时凭证）
    #[serde(skip_serializing)]
    pub session_token: String,
    /// AWS: https://s3.{region}.amazonaws.com
    /// MinIO: http://localhost:9000
    pub endpoint: String,
    /// 强制使用路径风格（MinIO等需要设置为true）
    pub use_path_style: bool,
    /// Directory for fetch temp files, system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    pub download_part_size: u64,
    pub download_concurrency: usize,
}

impl Default for S3Setting {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            session_token: String::new(),
            endpoint: String::new(),
            use_path_style: false,
            temp_dir: None,
            download_part_size: DEFAULT_PART_SIZE,
            download_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

fn non_empty_str<'a>(setting: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    setting.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn positive_u64(setting: &Map<String, Value>, key: &str) -> Option<u64> {
    setting.get(key).and_then(|v| v.as_u64()).filter(|n| *n > 0)
}

impl S3Setting {
    /// Normalize instance settings / 解析实例配置
    pub fn from_setting(setting: &Map<String, Value>) -> Self {
        let mut s = Self::default();

        if let Some(v) = non_empty_str(setting, "region") {
            s.region = v.to_string();
        }
        if let Some(v) = non_empty_str(setting, "bucket") {
            s.bucket = v.to_string();
        }
        // later synonyms override earlier ones
        for key in ["access", "accesskey", "access_key"] {
            if let Some(v) = non_empty_str(setting, key) {
                s.access_key = v.to_string();
            }
        }
        for key in ["secret", "secretkey", "secret_key"] {
            if let Some(v) = non_empty_str(setting, key) {
                s.secret_key = v.to_string();
            }
        }
        if let Some(v) = non_empty_str(setting, "session_token") {
            s.session_token = v.to_string();
        }
        if let Some(v) = non_empty_str(setting, "endpoint") {
            s.endpoint = v.to_string();
        }
        for key in ["path_style", "force_path_style"] {
            if let Some(v) = setting.get(key).and_then(|v| v.as_bool()) {
                s.use_path_style = v;
            }
        }

        if let Some(v) = non_empty_str(setting, "temp_dir") {
            s.temp_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = positive_u64(setting, "download_part_size") {
            s.download_part_size = v;
        }
        if let Some(v) = positive_u64(setting, "download_concurrency") {
            s.download_concurrency = v as usize;
        }

        if s.bucket.is_empty() {
            s.bucket = DEFAULT_BUCKET.to_string();
        }
        s
    }

    /// Whether any static credential was configured
    pub fn has_static_credentials(&self) -> bool {
        !self.access_key.is_empty() || !self.secret_key.is_empty() || !self.session_token.is_empty()
    }

    /// Endpoint URL with scheme, AWS regional endpoint when none configured
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.is_empty() {
            return format!("https://s3.{}.amazonaws.com", self.region);
        }
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("https://{}", self.endpoint)
        }
    }
}

impl fmt::Debug for S3Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "***" };
        f.debug_struct("S3Setting")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("session_token", &redact(&self.session_token))
            .field("endpoint", &self.endpoint)
            .field("use_path_style", &self.use_path_style)
            .field("temp_dir", &self.temp_dir)
            .field("download_part_size", &self.download_part_size)
            .field("download_concurrency", &self.download_concurrency)
            .finish()
    }
}
