//! S3驱动核心实现
//!
//! 设计原则：
//! - 所有操作为 async，网络I/O完成后才返回，并发由调用方决定
//! - 对象键只由 object_path 生成
//! - Fetch 先落地到临时文件，失败时不残留临时文件

use std::collections::{BTreeMap, HashMap};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::client::{ByteRange, ObjectClient, ObjectHeaders, RustS3Client};
use super::config::S3Setting;
use super::stream::TempStream;
use crate::storage::{
    BrowseOption, Connection, DownloadOption, FetchOption, File, Health, Instance, RemoveOption, Result,
    Stream, StorageError, UploadOption,
};

const DEFAULT_BROWSE_EXPIRES: Duration = Duration::from_secs(3600);
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// S3连接
pub struct S3Connection {
    instance: Arc<Instance>,
    setting: S3Setting,
    client: Option<Arc<dyn ObjectClient>>,
}

/// Storage key for a file: `prefix/key.type` / 获取对象键
pub fn object_path(file: &File) -> String {
    let name = if file.file_type().is_empty() {
        file.key().to_string()
    } else {
        format!("{}.{}", file.key(), file.file_type())
    };
    join_path(file.prefix(), &name)
}

/// Lexical join: empty and `.` segments dropped, `..` pops a segment or is kept when
/// there is nothing left to pop. A leading `/` is dropped since rust-s3 addresses
/// `/k` and `k` as the same object.
fn join_path(prefix: &str, name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in prefix.split('/').chain(name.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

/// Canonical tagging string, keys sorted / 标签编码
pub fn encode_tags(tags: &HashMap<String, Value>) -> String {
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();
    // space becomes %20 rather than form-style '+'; S3 decodes both the same
    keys.iter()
        .map(|k| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(&value_to_string(&tags[*k]))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn fetch_range(opt: &FetchOption) -> Result<Option<ByteRange>> {
    if opt.start.is_none() && opt.end.is_none() {
        return Ok(None);
    }
    let start = opt.start.unwrap_or(0);
    if let Some(end) = opt.end {
        if end < start {
            return Err(StorageError::validation(format!("invalid byte range {}-{}", start, end)));
        }
    }
    Ok(Some(ByteRange { start, end: opt.end }))
}

/// Split `[0, size)` into inclusive part ranges
fn part_ranges(size: u64, part_size: u64) -> Vec<ByteRange> {
    let part_size = part_size.max(1);
    (0..size)
        .step_by(part_size as usize)
        .map(|start| ByteRange {
            start,
            end: Some((start + part_size).min(size) - 1),
        })
        .collect()
}

/// Copy the object body into the temp file, rewound to 0
async fn fetch_into(client: &dyn ObjectClient, tmp: &mut TempStream, key: &str, range: Option<ByteRange>) -> Result<()> {
    let mut out = tokio::fs::File::from_std(tmp.file_mut()?.try_clone()?);
    client.get_object(key, range, &mut out).await?;
    out.flush().await?;
    drop(out);
    tmp.seek(SeekFrom::Start(0))?;
    Ok(())
}

impl S3Connection {
    pub fn new(instance: Arc<Instance>, setting: S3Setting) -> Self {
        Self {
            instance,
            setting,
            client: None,
        }
    }

    /// Open with a caller supplied client / 使用指定客户端打开
    pub async fn open_with(&mut self, client: Arc<dyn ObjectClient>) -> Result<()> {
        let bucket = &self.setting.bucket;
        match client.bucket_exists().await {
            Ok(true) => {}
            checked => {
                match checked {
                    Ok(_) => tracing::debug!("S3 bucket {} not found, creating", bucket),
                    Err(e) => tracing::warn!("S3 bucket check failed for {}: {}, creating", bucket, e),
                }
                client
                    .create_bucket()
                    .await
                    .map_err(|e| StorageError::connection(format!("创建存储桶 {} 失败: {}", bucket, e)))?;
            }
        }

        self.client = Some(client);
        tracing::info!("S3 connection opened: {} (bucket={})", self.instance.name, self.setting.bucket);
        Ok(())
    }

    fn client(&self) -> Result<&dyn ObjectClient> {
        self.client.as_deref().ok_or(StorageError::NotReady)
    }

    fn headers_for(&self, ext: &str, opt: &UploadOption) -> Result<ObjectHeaders> {
        let content_type = if !opt.mimetype.is_empty() {
            opt.mimetype.clone()
        } else {
            mime_guess::from_ext(ext)
                .first()
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
        };
        let metadata: BTreeMap<String, String> = opt
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();
        let headers = ObjectHeaders {
            content_type,
            expires: opt.expires.as_ref().map(http_date),
            metadata,
            tagging: if opt.tags.is_empty() { None } else { Some(encode_tags(&opt.tags)) },
        };
        headers.validate()?;
        Ok(headers)
    }

    /// Managed download: single GET for small objects, concurrent ranged GETs otherwise
    async fn download_into(&self, client: &dyn ObjectClient, key: &str, out: &mut tokio::fs::File) -> Result<u64> {
        let part_size = self.setting.download_part_size;
        let concurrency = self.setting.download_concurrency.max(1);

        let size = client.object_size(key).await?;
        if size <= part_size {
            client.get_object(key, None, out).await?;
            return Ok(size);
        }

        let ranges = part_ranges(size, part_size);
        tracing::debug!("S3分片下载: key={}, size={}, parts={}", key, size, ranges.len());
        let mut parts = stream::iter(ranges)
            .map(|range| async move {
                let mut data = Vec::new();
                client.get_object(key, Some(range), &mut data).await?;
                if Some(data.len() as u64) != range.expected_len() {
                    return Err(StorageError::RemoteMessage(format!(
                        "short read for {} at {}: {} bytes",
                        key,
                        range.header_value(),
                        data.len()
                    )));
                }
                Ok::<_, StorageError>((range.start, data))
            })
            .buffer_unordered(concurrency);

        let mut written = 0u64;
        while let Some(part) = parts.next().await {
            let (offset, data) = part?;
            out.seek(SeekFrom::Start(offset)).await?;
            out.write_all(&data).await?;
            written += data.len() as u64;
        }
        Ok(written)
    }
}

#[async_trait]
impl Connection for S3Connection {
    async fn open(&mut self) -> Result<()> {
        let client = RustS3Client::new(&self.setting)?;
        self.open_with(Arc::new(client)).await
    }

    fn health(&self) -> Health {
        Health {
            workload: if self.client.is_some() { 0 } else { 1 },
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            tracing::info!("S3 connection closed: {}", self.instance.name);
        }
        Ok(())
    }

    async fn upload(&self, source: &Path, opt: UploadOption) -> Result<File> {
        let client = self.client()?;
        let meta = match tokio::fs::metadata(source).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::validation(format!("upload source not found: {}", source.display())));
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            return Err(StorageError::validation("directory upload not supported"));
        }
        if opt.key.is_empty() {
            return Err(StorageError::validation("missing upload key"));
        }

        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let headers = self.headers_for(&ext, &opt)?;
        let file = self.instance.new_file(&opt.prefix, &opt.key, &ext, meta.len());
        let key = object_path(&file);

        tracing::debug!("S3上传: key={}, size={}, content_type={}", key, meta.len(), headers.content_type);
        let mut body = tokio::fs::File::open(source).await?;
        client.put_object(&key, &mut body, &headers).await?;
        Ok(file)
    }

    async fn fetch(&self, file: &File, opt: FetchOption) -> Result<Box<dyn Stream>> {
        let client = self.client()?;
        let range = fetch_range(&opt)?;
        let key = object_path(file);
        tracing::debug!("S3读取: key={}, range={:?}", key, range.map(|r| r.header_value()));

        let mut tmp = TempStream::create(self.setting.temp_dir.as_deref())?;
        if let Err(e) = fetch_into(client, &mut tmp, &key, range).await {
            if let Err(ce) = tmp.close() {
                tracing::warn!("S3 temp file cleanup failed: {}", ce);
            }
            return Err(e);
        }
        Ok(Box::new(tmp))
    }

    async fn download(&self, file: &File, opt: DownloadOption) -> Result<PathBuf> {
        let client = self.client()?;
        let target = opt.target;
        if target.as_os_str().is_empty() {
            return Err(StorageError::validation("invalid target"));
        }
        if let Ok(meta) = tokio::fs::metadata(&target).await {
            if !meta.is_dir() {
                tracing::debug!("S3下载跳过，本地文件已存在: {}", target.display());
                return Ok(target);
            }
        }
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let key = object_path(file);
        let mut out = tokio::fs::File::create(&target).await?;
        let result = match self.download_into(client, &key, &mut out).await {
            Ok(n) => out.flush().await.map(|_| n).map_err(StorageError::from),
            Err(e) => Err(e),
        };
        drop(out);

        match result {
            Ok(n) => {
                tracing::debug!("S3下载完成: key={}, bytes={}, target={}", key, n, target.display());
                Ok(target)
            }
            Err(e) => {
                if let Err(re) = tokio::fs::remove_file(&target).await {
                    tracing::warn!("S3 partial download cleanup failed: {}", re);
                }
                Err(e)
            }
        }
    }

    async fn remove(&self, file: &File, _opt: RemoveOption) -> Result<()> {
        let client = self.client()?;
        let key = object_path(file);
        tracing::debug!("S3删除: key={}", key);
        client.delete_object(&key).await
    }

    async fn browse(&self, file: &File, opt: BrowseOption) -> Result<String> {
        let client = self.client()?;
        let expires = opt
            .expires
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_BROWSE_EXPIRES);
        client.presign_get(&object_path(file), expires).await
    }
}
