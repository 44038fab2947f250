//! 密码重置一次性验证码

use chrono::Duration;

use crate::errors::DomainError;
use crate::value_objects::{Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: Timestamp,
}

impl PasswordResetToken {
    pub fn issue(token: impl Into<String>, user_id: UserId, now: Timestamp, ttl: Duration) -> Self {
        Self {
            token: token.into(),
            user_id,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// 校验未过期，返回令牌所属用户。
    pub fn redeem(&self, now: Timestamp) -> Result<UserId, DomainError> {
        if self.is_expired(now) {
            return Err(DomainError::ResetTokenExpired);
        }
        Ok(self.user_id)
    }
}
