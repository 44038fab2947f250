//! 一对一会话

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub created_at: Timestamp,
}

impl Conversation {
    /// 两个参与者必须不同。
    pub fn check_participants(user1_id: UserId, user2_id: UserId) -> Result<(), DomainError> {
        if user1_id == user2_id {
            return Err(DomainError::invalid_argument(
                "recipient_username",
                "cannot start a conversation with yourself",
            ));
        }
        Ok(())
    }

    pub fn participants(&self) -> (UserId, UserId) {
        (self.user1_id, self.user2_id)
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// 返回另一位参与者；`user_id` 不在会话中时返回 `None`。
    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }

    pub fn ensure_participant(&self, user_id: UserId) -> Result<(), DomainError> {
        if self.has_participant(user_id) {
            Ok(())
        } else {
            Err(DomainError::NotParticipant)
        }
    }

    /// 无序用户对的规范形式，用于唯一性判断。
    pub fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
