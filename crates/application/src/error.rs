use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::image_store::ImageStoreError;
use crate::mailer::MailError;
use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("mail error: {0}")]
    Mail(#[from] MailError),
    #[error("image store error: {0}")]
    ImageStore(#[from] ImageStoreError),
    /// 某个实时连接上的传输错误
    #[error("connection error: {0}")]
    Connection(String),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
    #[error("authentication failed")]
    Authentication,
}

/// 对外暴露的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Invalid,
    Conflict,
    Unauthorized,
    Storage,
    Connection,
    Internal,
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. }
                | DomainError::InvalidResetToken
                | DomainError::ResetTokenExpired
                | DomainError::MissingEmail => ErrorKind::Invalid,
                DomainError::UserNotFound | DomainError::ConversationNotFound => {
                    ErrorKind::NotFound
                }
                DomainError::UserAlreadyExists { .. } => ErrorKind::Conflict,
                DomainError::NotParticipant => ErrorKind::Forbidden,
            },
            ApplicationError::Repository(err) => match err {
                RepositoryError::NotFound => ErrorKind::NotFound,
                RepositoryError::Conflict(_) => ErrorKind::Conflict,
                RepositoryError::Storage { .. } => ErrorKind::Storage,
            },
            ApplicationError::Connection(_) => ErrorKind::Connection,
            ApplicationError::Authentication => ErrorKind::Unauthorized,
            ApplicationError::Password(_)
            | ApplicationError::Mail(_)
            | ApplicationError::ImageStore(_)
            | ApplicationError::Infrastructure(_) => ErrorKind::Internal,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
