//! 应用层实现。
//!
//! 用例服务围绕领域模型处理输入校验与权限判断，并通过 trait 抽象外部适配器
//! （存储、密码哈希、邮件、对象存储）。实时推送的核心是 [`registry`]、
//! [`ingress`] 和 [`session`] 三个模块。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod image_store;
pub mod ingress;
pub mod mailer;
pub mod memory;
pub mod password;
pub mod registry;
pub mod repository;
pub mod services;
pub mod session;

#[cfg(test)]
mod test_support;

pub use broadcaster::{BroadcastReport, MessageBroadcaster};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApplicationError, ErrorKind};
pub use image_store::{ImageStoreError, ProfileImageStore};
pub use ingress::{MessageIngress, MessageIngressDependencies};
pub use mailer::{MailError, Mailer, OutgoingEmail};
pub use password::{PasswordHasher, PasswordHasherError};
pub use registry::{Connection, ConnectionId, ConnectionRegistry};
pub use repository::{
    ConversationRepository, MessageRepository, PasswordResetRepository, UserRepository,
};
pub use services::{
    AuthenticateUserRequest, ConversationService, ConversationServiceDependencies,
    PasswordResetService, PasswordResetServiceDependencies, ProfileImageUpload,
    RegisterUserRequest, ResetPasswordRequest, UserService, UserServiceDependencies,
};
pub use session::{ConnectionSession, ConnectionState};
