use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 头像对象存储，返回可直接对外访问的 URL
#[async_trait]
pub trait ProfileImageStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ImageStoreError>;
}
