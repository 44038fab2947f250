//! 聊天系统核心领域模型
//!
//! 包含用户、一对一会话、消息、密码重置令牌等实体，以及相关的校验规则。

pub mod conversation;
pub mod errors;
pub mod message;
pub mod password_reset;
pub mod user;
pub mod value_objects;

pub use conversation::Conversation;
pub use errors::{DomainError, RepositoryError};
pub use message::{Message, NewMessage};
pub use password_reset::PasswordResetToken;
pub use user::{NewUser, User};
pub use value_objects::{
    ConversationId, MessageId, MessageText, PasswordHash, Timestamp, UserEmail, UserId, Username,
};
