//! 基础设施层实现。
//!
//! 提供 Postgres 仓储、bcrypt 密码哈希、SMTP 邮件、头像对象存储等适配器，
//! 实现应用层定义的接口。

pub mod builder;
pub mod image_store;
pub mod mail;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError};
pub use image_store::{LocalImageStore, S3ImageStore};
pub use mail::SmtpMailer;
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgConversationRepository, PgMessageRepository, PgPasswordResetRepository,
    PgStorage, PgUserRepository,
};
