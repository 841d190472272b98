//! Generic storage contract shared by all drivers / 通用存储接口
//!
//! Drivers only see the narrow surface defined here: the instance settings, the file
//! record factory, the option structs and the connection lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod error;
pub mod manager;

pub use error::{Result, StorageError};
pub use manager::StorageManager;

/// Configuration item definition / 配置项定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    /// Display title (friendly name) / 显示标题
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ConfigItem {
    pub fn new(name: &str, item_type: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            item_type: item_type.to_string(),
            default: None,
            required: false,
            help: None,
        }
    }

    pub fn title(mut self, val: &str) -> Self {
        self.title = Some(val.to_string());
        self
    }

    pub fn default(mut self, val: &str) -> Self {
        self.default = Some(val.to_string());
        self
    }

    pub fn help(mut self, val: &str) -> Self {
        self.help = Some(val.to_string());
        self
    }
}

/// Complete driver information / 驱动完整信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    pub driver_type: String,
    /// Driver-specific configuration items / 驱动特有配置项
    pub additional: Vec<ConfigItem>,
}

/// Configured storage backend / 存储实例
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name, unique per manager / 实例名称
    pub name: String,
    /// Registered driver type, e.g. "s3" / 驱动类型
    pub driver: String,
    /// Loosely-typed driver settings / 驱动配置
    #[serde(default)]
    pub setting: Map<String, Value>,
}

impl Instance {
    pub fn new(name: &str, driver: &str, setting: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            driver: driver.to_string(),
            setting,
        }
    }

    /// File record factory / 文件记录工厂
    pub fn new_file(&self, prefix: &str, key: &str, file_type: &str, size: u64) -> File {
        File {
            instance: self.name.clone(),
            prefix: prefix.to_string(),
            key: key.to_string(),
            file_type: file_type.to_string(),
            size,
        }
    }
}

/// Stored file record / 文件记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    instance: String,
    prefix: String,
    key: String,
    file_type: String,
    size: u64,
}

impl File {
    /// Name of the instance that created this record
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Extension without the leading dot, may be empty / 文件类型
    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Upload options / 上传选项
#[derive(Debug, Clone, Default)]
pub struct UploadOption {
    pub key: String,
    pub prefix: String,
    pub mimetype: String,
    pub expires: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, Value>,
    pub tags: HashMap<String, Value>,
}

/// Fetch options, inclusive byte range / 读取选项
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOption {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadOption {
    pub target: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOption {}

/// Browse (presign) options / 预签名选项
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowseOption {
    pub expires: Option<Duration>,
}

/// Health report, workload 0 means ready / 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub workload: u32,
}

/// Seekable, randomly readable file stream / 可随机读取的文件流
pub trait Stream: Read + Seek + Send {
    /// Read at an absolute offset without moving the cursor / 定位读取
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;

    /// Release the stream and its backing resources / 关闭并释放
    fn close(&mut self) -> std::io::Result<()>;
}

/// Live connection to a storage backend / 存储连接
///
/// Every operation completes its network I/O before returning; the host decides how
/// many run in parallel. `open` and `close` need exclusive access, the data operations
/// only read the client and may run concurrently.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn open(&mut self) -> Result<()>;

    fn health(&self) -> Health;

    async fn close(&mut self) -> Result<()>;

    /// Upload a local file / 上传本地文件
    async fn upload(&self, source: &Path, opt: UploadOption) -> Result<File>;

    /// Fetch into a temporary local stream / 读取为临时流
    async fn fetch(&self, file: &File, opt: FetchOption) -> Result<Box<dyn Stream>>;

    /// Download into a local path / 下载到本地路径
    async fn download(&self, file: &File, opt: DownloadOption) -> Result<PathBuf>;

    async fn remove(&self, file: &File, opt: RemoveOption) -> Result<()>;

    /// Time-limited public URL / 生成临时访问链接
    async fn browse(&self, file: &File, opt: BrowseOption) -> Result<String>;
}

/// Driver factory trait / 驱动工厂 trait
pub trait Driver: Send + Sync {
    /// Driver type name / 驱动类型名称
    fn driver_type(&self) -> &'static str;

    /// Create a connection for the instance, not yet opened / 创建连接
    fn connect(&self, instance: Arc<Instance>) -> Result<Box<dyn Connection>>;

    /// Return driver specific config items / 返回驱动特有配置项
    fn additional_items(&self) -> Vec<ConfigItem> {
        Vec::new()
    }

    fn driver_info(&self) -> DriverInfo {
        DriverInfo {
            driver_type: self.driver_type().to_string(),
            additional: self.additional_items(),
        }
    }
}
