use std::sync::Arc;
use std::time::Duration;

use application::{MailError, Mailer, PasswordHasher, ProfileImageStore};
use config::{AppConfig, StorageBackend};
use thiserror::Error;

use crate::{
    image_store::{LocalImageStore, S3ImageStore},
    mail::SmtpMailer,
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("mail error: {0}")]
    Mail(#[from] MailError),
    #[error("storage misconfigured: {0}")]
    Storage(String),
}

/// 按配置组装的全部外部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub storage: Arc<PgStorage>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
    pub mailer: Arc<SmtpMailer>,
    pub image_store: Arc<dyn ProfileImageStore>,
}

impl Infrastructure {
    /// 连接数据库并执行迁移
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let db = &config.database;
        let pool = create_pg_pool(
            &db.url,
            db.max_connections,
            db.min_connections,
            Duration::from_secs(db.acquire_timeout_seconds),
        )
        .await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!("数据库迁移完成");

        let image_store: Arc<dyn ProfileImageStore> = match config.storage.backend {
            StorageBackend::Local => Arc::new(LocalImageStore::new(
                &config.storage.local_dir,
                &config.storage.public_base_url,
            )),
            StorageBackend::S3 => {
                let bucket = config.storage.s3_bucket.clone().ok_or_else(|| {
                    InfrastructureError::Storage("storage.s3_bucket is required".into())
                })?;
                Arc::new(S3ImageStore::from_env(bucket, config.storage.s3_region.clone()).await)
            }
        };

        Ok(Self {
            storage: Arc::new(PgStorage::new(pool)),
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost)),
            mailer: Arc::new(SmtpMailer::new(&config.mail)?),
            image_store,
        })
    }

    pub fn password_hasher_trait(&self) -> Arc<dyn PasswordHasher> {
        self.password_hasher.clone()
    }

    pub fn mailer_trait(&self) -> Arc<dyn Mailer> {
        self.mailer.clone()
    }
}
