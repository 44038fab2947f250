use application::ApplicationError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

/// HTTP 错误响应体，同时用作 WebSocket 错误帧
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }

    /// 序列化为 WebSocket 文本帧
    pub fn to_frame(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"unavailable"}}"#, self.body.code)
        })
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use ApplicationError as AppErr;

        match error {
            AppErr::Domain(err) => match err {
                DomainError::InvalidArgument { field, reason } => ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_ARGUMENT",
                    format!("{field}: {reason}"),
                ),
                DomainError::UserNotFound => {
                    ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "User not found")
                }
                DomainError::UserAlreadyExists { field } => ApiError::new(
                    StatusCode::CONFLICT,
                    "USER_EXISTS",
                    format!("{field} already registered"),
                ),
                DomainError::ConversationNotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "CONVERSATION_NOT_FOUND",
                    "Conversation not found",
                ),
                DomainError::NotParticipant => ApiError::new(
                    StatusCode::FORBIDDEN,
                    "NOT_PARTICIPANT",
                    "You are not a participant in this conversation",
                ),
                DomainError::InvalidResetToken => ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_RESET_TOKEN",
                    "Invalid or expired reset token",
                ),
                DomainError::ResetTokenExpired => ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "RESET_TOKEN_EXPIRED",
                    "Reset token expired",
                ),
                DomainError::MissingEmail => ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "MISSING_EMAIL",
                    "User has no email address on file",
                ),
            },
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict(what) => ApiError::new(
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("{what} already exists"),
                ),
                RepositoryError::Storage { message } => {
                    tracing::error!(error = %message, "存储操作失败");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        "failed to access storage",
                    )
                }
            },
            AppErr::Password(err) => {
                tracing::error!(error = %err, "密码哈希失败");
                ApiError::internal_server_error("password processing failed")
            }
            AppErr::Mail(err) => {
                tracing::error!(error = %err, "邮件发送失败");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MAIL_ERROR",
                    "failed to send email",
                )
            }
            AppErr::ImageStore(err) => {
                tracing::error!(error = %err, "头像上传失败");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UPLOAD_FAILED",
                    "Failed to upload image",
                )
            }
            AppErr::Connection(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONNECTION_ERROR",
                message,
            ),
            AppErr::Infrastructure(message) => {
                tracing::error!(error = %message, "基础设施错误");
                ApiError::internal_server_error("internal error")
            }
            AppErr::Authentication => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                "Incorrect username or password",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let unauthorized = self.status == StatusCode::UNAUTHORIZED;
        let mut response = (self.status, Json(self.body)).into_response();
        if unauthorized {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
