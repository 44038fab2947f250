use domain::ConversationId;

use crate::registry::ConnectionId;

/// 一次广播的投递结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// 投递失败并已从注册表移除的连接
    pub evicted: Vec<ConnectionId>,
}

impl BroadcastReport {
    pub fn is_empty(&self) -> bool {
        self.delivered == 0 && self.evicted.is_empty()
    }
}

/// 把已持久化的消息推送给会话内的在线连接。
///
/// 投递只是入队，不会阻塞；单个连接失败不会影响其他连接，也不会向调用方报错。
pub trait MessageBroadcaster: Send + Sync {
    fn broadcast(
        &self,
        conversation_id: ConversationId,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport;
}
