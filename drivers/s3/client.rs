//! Object store capability used by the S3 connection
//!
//! [`ObjectClient`] is the only place the driver touches the network. [`RustS3Client`]
//! is the production implementation over `rust-s3`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use s3::bucket::Bucket;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::Region;
use tokio::io::AsyncWrite;

use super::config::S3Setting;
use crate::storage::{Result, StorageError};

/// Sink for an object body / 对象内容写入端
pub type ObjectWriter<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Inclusive byte range / 字节范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// HTTP Range header value
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }

    /// Byte count when the end is known
    pub fn expected_len(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }
}

/// Optional headers sent with a put / 上传附加头
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub content_type: String,
    /// HTTP date
    pub expires: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Canonical `k=v&k2=v2` tagging string
    pub tagging: Option<String>,
}

impl ObjectHeaders {
    pub const META_PREFIX: &'static str = "x-amz-meta-";

    /// Reject anything that is not a legal HTTP header / 校验请求头
    pub fn validate(&self) -> Result<()> {
        header_value("Content-Type", &self.content_type)?;
        if let Some(expires) = &self.expires {
            header_value("Expires", expires)?;
        }
        for (k, v) in &self.metadata {
            let name = format!("{}{}", Self::META_PREFIX, k);
            HeaderName::from_str(&name)
                .map_err(|_| StorageError::validation(format!("invalid metadata key: {:?}", k)))?;
            header_value(&name, v)?;
        }
        if let Some(tagging) = &self.tagging {
            header_value("x-amz-tagging", tagging)?;
        }
        Ok(())
    }
}

fn header_value(name: &str, value: &str) -> Result<()> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| StorageError::validation(format!("invalid value for header {}: {:?}", name, value)))
}

/// Object storage capability / 对象存储能力
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Whether this bucket is reachable and present / 存储桶是否存在
    async fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket; already owning it counts as success / 创建存储桶
    async fn create_bucket(&self) -> Result<()>;

    async fn put_object(&self, key: &str, body: &mut tokio::fs::File, headers: &ObjectHeaders) -> Result<()>;

    /// Stream the object (or a range of it) into `out` / 读取对象写入 out
    async fn get_object(&self, key: &str, range: Option<ByteRange>, out: ObjectWriter<'_>) -> Result<()>;

    /// Content length of an object / 对象大小
    async fn object_size(&self, key: &str) -> Result<u64>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Presigned GET URL, computed locally / 预签名URL
    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String>;
}

fn check_status(status: u16, key: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(StorageError::RemoteStatus {
            status,
            key: key.to_string(),
        })
    }
}

/// Bucket listing status: 2xx present, 404 absent
fn listing_status(status: u16, bucket: &str) -> Result<bool> {
    match status {
        200..=299 => Ok(true),
        404 => Ok(false),
        _ => Err(StorageError::RemoteStatus {
            status,
            key: bucket.to_string(),
        }),
    }
}

fn no_such_bucket(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _)) || err.to_string().contains("NoSuchBucket")
}

/// CreateBucket answer; 409 BucketAlreadyOwnedByYou means the bucket is usable
fn create_status(status: u16, body: &str, bucket: &str) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    if status == 409 && body.contains("BucketAlreadyOwnedByYou") {
        tracing::debug!("S3 bucket {} already owned, reusing", bucket);
        return Ok(());
    }
    Err(StorageError::RemoteStatus {
        status,
        key: bucket.to_string(),
    })
}

/// `rust-s3` backed client
pub struct RustS3Client {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl RustS3Client {
    /// 创建S3 Bucket客户端
    pub fn new(setting: &S3Setting) -> Result<Self> {
        let credentials = Self::credentials(setting)?;

        let region = Region::Custom {
            region: setting.region.clone(),
            endpoint: setting.endpoint_url(),
        };

        let bucket = Bucket::new(&setting.bucket, region.clone(), credentials.clone())
            .map_err(|e| StorageError::connection(format!("创建S3 Bucket失败: {}", e)))?;

        let bucket = if setting.use_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            region,
            credentials,
            path_style: setting.use_path_style,
        })
    }

    fn credentials(setting: &S3Setting) -> Result<Credentials> {
        if setting.has_static_credentials() {
            let token = if setting.session_token.is_empty() {
                None
            } else {
                Some(setting.session_token.as_str())
            };
            return Credentials::new(
                Some(setting.access_key.as_str()),
                Some(setting.secret_key.as_str()),
                token,
                None,
                None,
            )
            .map_err(|e| StorageError::connection(format!("创建S3凭证失败: {}", e)));
        }

        // ambient chain (env, profile, instance metadata), anonymous as last resort
        match Credentials::default() {
            Ok(creds) => Ok(creds),
            Err(e) => {
                tracing::debug!("S3 ambient credentials unavailable, using anonymous: {}", e);
                Credentials::anonymous().map_err(|e| StorageError::connection(format!("创建S3凭证失败: {}", e)))
            }
        }
    }
}

#[async_trait]
impl ObjectClient for RustS3Client {
    async fn bucket_exists(&self) -> Result<bool> {
        // ListObjectsV2 with max-keys=1 only needs rights on this bucket (Bucket::exists lists the account)
        match self.bucket.list_page(String::new(), None, None, None, Some(1)).await {
            Ok((_, status)) => listing_status(status, &self.bucket.name()),
            Err(e) if no_such_bucket(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        let name = self.bucket.name();
        let config = BucketConfiguration::default();
        let created = if self.path_style {
            Bucket::create_with_path_style(&name, self.region.clone(), self.credentials.clone(), config).await
        } else {
            Bucket::create(&name, self.region.clone(), self.credentials.clone(), config).await
        };
        match created {
            Ok(response) => create_status(response.response_code, &response.response_text, &name),
            Err(S3Error::HttpFailWithBody(status, body)) => create_status(status, &body, &name),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, key: &str, body: &mut tokio::fs::File, headers: &ObjectHeaders) -> Result<()> {
        // add_header panics on malformed input
        headers.validate()?;

        let mut bucket = self.bucket.clone();
        if let Some(expires) = &headers.expires {
            bucket.add_header("Expires", expires);
        }
        for (k, v) in &headers.metadata {
            bucket.add_header(&format!("{}{}", ObjectHeaders::META_PREFIX, k), v);
        }
        if let Some(tagging) = &headers.tagging {
            bucket.add_header("x-amz-tagging", tagging);
        }

        let response = bucket
            .put_object_stream_with_content_type(body, key, &headers.content_type)
            .await?;
        check_status(response.status_code(), key)
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>, out: ObjectWriter<'_>) -> Result<()> {
        let mut writer = out;
        let status = match range {
            Some(r) => {
                self.bucket
                    .get_object_range_to_writer(key, r.start, r.end, &mut writer)
                    .await?
            }
            None => self.bucket.get_object_to_writer(key, &mut writer).await?,
        };
        check_status(status, key)
    }

    async fn object_size(&self, key: &str) -> Result<u64> {
        let (head, status) = self.bucket.head_object(key).await?;
        check_status(status, key)?;
        Ok(head.content_length.unwrap_or(0).max(0) as u64)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self.bucket.delete_object(key).await?;
        check_status(response.status_code(), key)
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String> {
        let secs = expires.as_secs().clamp(1, u32::MAX as u64) as u32;
        Ok(self.bucket.presign_get(key, secs, None).await?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> RustS3Client {
        let mut setting = S3Setting::default();
        setting.access_key = "AKIDEXAMPLE".to_string();
        setting.secret_key = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string();
        setting.endpoint = "127.0.0.1:9".to_string();
        setting.use_path_style = true;
        RustS3Client::new(&setting).unwrap()
    }

    #[test]
    fn test_range_header() {
        let r = ByteRange { start: 10, end: Some(19) };
        assert_eq!(r.header_value(), "bytes=10-19");
        assert_eq!(r.expected_len(), Some(10));
        let r = ByteRange { start: 7, end: Some(7) };
        assert_eq!(r.header_value(), "bytes=7-7");
        assert_eq!(r.expected_len(), Some(1));
        let r = ByteRange { start: 0, end: None };
        assert_eq!(r.header_value(), "bytes=0-");
        assert_eq!(r.expected_len(), None);
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(200, "a").is_ok());
        assert!(check_status(206, "a").is_ok());
        let err = check_status(403, "a/b.txt").unwrap_err();
        assert!(matches!(err, StorageError::RemoteStatus { status: 403, ref key } if key == "a/b.txt"));
        assert!(err.is_remote());
    }

    #[test]
    fn test_bucket_listing_and_create_status() {
        assert!(listing_status(200, "b").unwrap());
        assert!(!listing_status(404, "b").unwrap());
        assert!(matches!(
            listing_status(403, "b"),
            Err(StorageError::RemoteStatus { status: 403, .. })
        ));

        let owned = "<Error><Code>BucketAlreadyOwnedByYou</Code></Error>";
        assert!(create_status(200, "", "b").is_ok());
        assert!(create_status(409, owned, "b").is_ok());
        let taken = "<Error><Code>BucketAlreadyExists</Code></Error>";
        assert!(matches!(
            create_status(409, taken, "b"),
            Err(StorageError::RemoteStatus { status: 409, .. })
        ));
        assert!(create_status(403, "", "b").is_err());

        assert!(no_such_bucket(&S3Error::HttpFailWithBody(404, String::new())));
        assert!(!no_such_bucket(&S3Error::HttpFailWithBody(403, "AccessDenied".to_string())));
    }

    #[test]
    fn test_headers_validate() {
        let mut headers = ObjectHeaders {
            content_type: "text/plain".to_string(),
            expires: Some("Tue, 01 Jan 2030 00:00:00 GMT".to_string()),
            tagging: Some("a=1&b=two%20words".to_string()),
            ..Default::default()
        };
        headers.metadata.insert("owner".to_string(), "alice".to_string());
        assert!(headers.validate().is_ok());

        let mut bad_key = headers.clone();
        bad_key.metadata.insert("my key".to_string(), "v".to_string());
        assert!(matches!(bad_key.validate(), Err(StorageError::Validation(_))));

        let mut bad_value = headers.clone();
        bad_value.metadata.insert("note".to_string(), "line1\nline2".to_string());
        assert!(matches!(bad_value.validate(), Err(StorageError::Validation(_))));

        let bad_type = ObjectHeaders {
            content_type: "text/plain\r\nx-evil: 1".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad_type.validate(), Err(StorageError::Validation(_))));
    }

    #[tokio::test]
    async fn test_put_with_bad_metadata_is_rejected_without_panic() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"x").unwrap();
        let mut body = tokio::fs::File::open(&local).await.unwrap();

        let mut headers = ObjectHeaders {
            content_type: "text/plain".to_string(),
            ..Default::default()
        };
        headers.metadata.insert("my key".to_string(), "v".to_string());

        let err = offline_client().put_object("k", &mut body, &headers).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_presign_is_offline_and_uses_expiry() {
        let url = offline_client()
            .presign_get("docs/report.pdf", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("https://"));
        assert!(url.contains("/default/docs/report.pdf"));
        assert!(url.contains("X-Amz-Expires=3600"));
    }
}
