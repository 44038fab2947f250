//! 头像存储：S3 或本地目录（由 `/static` 对外提供）

use std::path::PathBuf;

use application::{ImageStoreError, ProfileImageStore};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

pub struct S3ImageStore {
    client: Client,
    bucket: String,
    region: Option<String>,
}

impl S3ImageStore {
    pub async fn from_env(bucket: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
            bucket: bucket.into(),
            region,
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.region {
            Some(region) => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, region, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

#[async_trait]
impl ProfileImageStore for S3ImageStore {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ImageStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| ImageStoreError::Upload(err.to_string()))?;

        tracing::debug!(bucket = %self.bucket, key, "头像已上传到 S3");
        Ok(self.public_url(key))
    }
}

pub struct LocalImageStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl ProfileImageStore for LocalImageStore {
    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ImageStoreError> {
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ImageStoreError::Upload(format!("invalid object key: {key}")));
        }
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        Ok(format!("{}/{}", self.public_base_url, key))
    }
}
