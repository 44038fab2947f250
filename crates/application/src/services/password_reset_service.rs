use std::sync::Arc;

use chrono::Duration;
use domain::{DomainError, PasswordResetToken, RepositoryError, UserId, Username};
use rand::Rng;
use tokio::task::JoinHandle;

use crate::{
    clock::Clock,
    error::ApplicationError,
    mailer::{Mailer, OutgoingEmail},
    password::{validate_new_password, PasswordHasher},
    repository::{PasswordResetRepository, UserRepository},
};

const MAX_OTP_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
}

pub struct PasswordResetServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub reset_repository: Arc<dyn PasswordResetRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub token_ttl: Duration,
}

pub struct PasswordResetService {
    deps: PasswordResetServiceDependencies,
}

impl PasswordResetService {
    pub fn new(deps: PasswordResetServiceDependencies) -> Self {
        Self { deps }
    }

    /// 生成 6 位验证码并在后台发送邮件。
    ///
    /// 返回的句柄可以忽略；邮件发送失败只记录日志。
    pub async fn request_reset(
        &self,
        username: &str,
    ) -> Result<JoinHandle<()>, ApplicationError> {
        let username = Username::parse(username)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        let email = user.email.clone().ok_or(DomainError::MissingEmail)?;

        let otp = self.store_new_token(user.id).await?;
        tracing::info!(user_id = %user.id, "已生成密码重置验证码");

        let mailer = Arc::clone(&self.deps.mailer);
        let message = OutgoingEmail {
            to: email.as_str().to_owned(),
            subject: "Your Password Reset OTP".into(),
            body: format!(
                "Your OTP for resetting your password on BUZZ! is: {otp}\n\n\
                 This OTP is valid for {}.",
                describe_ttl(self.deps.token_ttl)
            ),
        };
        let user_id = user.id;
        Ok(tokio::spawn(async move {
            if let Err(err) = mailer.send(message).await {
                tracing::error!(%user_id, error = %err, "发送重置验证码邮件失败");
            }
        }))
    }

    /// 生成并保存验证码；与其他用户未使用的验证码重复时重新生成
    async fn store_new_token(&self, user_id: UserId) -> Result<String, ApplicationError> {
        let mut attempt = 1;
        loop {
            let otp = generate_otp();
            let token = PasswordResetToken::issue(
                otp.clone(),
                user_id,
                self.deps.clock.now(),
                self.deps.token_ttl,
            );
            match self.deps.reset_repository.store(token).await {
                Ok(()) => return Ok(otp),
                Err(RepositoryError::Conflict(_)) if attempt < MAX_OTP_ATTEMPTS => {
                    tracing::debug!(%user_id, attempt, "验证码与已有验证码重复，重新生成");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<(), ApplicationError> {
        validate_new_password("new_password", &request.new_password)?;

        let token = self
            .deps
            .reset_repository
            .take(request.reset_token.trim())
            .await?
            .ok_or(DomainError::InvalidResetToken)?;
        let user_id = token.redeem(self.deps.clock.now())?;

        let password = self.deps.password_hasher.hash(&request.new_password).await?;
        self.deps
            .user_repository
            .update_password(user_id, password)
            .await?;
        tracing::info!(%user_id, "密码已重置");
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, ApplicationError> {
        let purged = self
            .deps
            .reset_repository
            .purge_expired(self.deps.clock.now())
            .await?;
        Ok(purged)
    }
}

fn generate_otp() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

fn describe_ttl(ttl: Duration) -> String {
    let minutes = ttl.num_minutes();
    if minutes % 60 == 0 {
        match minutes / 60 {
            1 => "1 hour".to_owned(),
            hours => format!("{hours} hours"),
        }
    } else {
        format!("{minutes} minutes")
    }
}
