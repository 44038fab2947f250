use domain::{Conversation, ConversationId, Message, MessageId, Timestamp, User, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserDto {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: Timestamp,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.as_str().to_owned(),
            email: user.email.as_ref().map(|email| email.as_str().to_owned()),
            profile_image_url: user.profile_image_url.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationDto {
    pub conversation_id: ConversationId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub created_at: Timestamp,
}

impl From<&Conversation> for ConversationDto {
    fn from(conversation: &Conversation) -> Self {
        Self {
            conversation_id: conversation.id,
            user1_id: conversation.user1_id,
            user2_id: conversation.user2_id,
            created_at: conversation.created_at,
        }
    }
}

/// 历史消息与实时推送共用的消息格式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDto {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub message_text: String,
    pub sent_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            message_text: message.text.as_str().to_owned(),
            sent_at: message.sent_at,
        }
    }
}

/// 会话列表中的对方用户，头像为空时使用默认占位图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationPartnerDto {
    pub user_id: UserId,
    pub username: String,
    pub profile_image_url: String,
}
