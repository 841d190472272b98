use thiserror::Error;

/// Storage error / 存储错误
#[derive(Error, Debug)]
pub enum StorageError {
    /// Data operation before open or after close / 连接未就绪
    #[error("storage client not ready")]
    NotReady,

    /// Invalid caller input / 参数校验失败
    #[error("invalid request: {0}")]
    Validation(String),

    /// Client construction or bucket check failed / 连接失败
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("remote storage error: {0}")]
    Remote(#[from] s3::error::S3Error),

    #[error("remote storage returned status {status} for '{key}'")]
    RemoteStatus { status: u16, key: String },

    /// Failure reported by an injected object client / 外部客户端错误
    #[error("remote storage error: {0}")]
    RemoteMessage(String),

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("driver type not found: {0}")]
    UnknownDriver(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StorageError::Validation(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        StorageError::Connection(msg.into())
    }

    /// Whether the error came from the remote store / 是否为远端错误
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            StorageError::Remote(_) | StorageError::RemoteStatus { .. } | StorageError::RemoteMessage(_)
        )
    }
}
