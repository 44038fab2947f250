//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("user not found")]
    UserNotFound,

    /// 用户名或邮箱已被占用
    #[error("{field} already registered")]
    UserAlreadyExists { field: String },

    #[error("conversation not found")]
    ConversationNotFound,

    /// 发送者不是会话参与者
    #[error("user is not a participant in this conversation")]
    NotParticipant,

    #[error("invalid or expired reset token")]
    InvalidResetToken,

    #[error("reset token expired")]
    ResetTokenExpired,

    /// 用户没有登记邮箱，无法发送验证码
    #[error("user has no email address on file")]
    MissingEmail,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn already_exists(field: impl Into<String>) -> Self {
        Self::UserAlreadyExists {
            field: field.into(),
        }
    }
}

/// 持久化层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one: {0}")]
    Conflict(String),
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
