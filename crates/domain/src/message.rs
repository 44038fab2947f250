use crate::value_objects::{ConversationId, MessageId, MessageText, Timestamp, UserId};

/// 已持久化的消息，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: MessageText,
    pub sent_at: Timestamp,
}

/// 待写入的消息；ID 与发送时间由存储层分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: MessageText,
}
