//! 实时连接注册表
//!
//! 按会话分区维护在线连接：`ConversationId -> {ConnectionId -> Connection}`。
//! 会话键只在连接集合非空时存在。每个操作通过 `DashMap` 的 entry API 在该会话
//! 所在分片的锁内完成，锁内不做任何 await，投递只是向对端的有界队列 `try_send`。

use std::collections::HashMap;
use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ConversationId, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcaster::{BroadcastReport, MessageBroadcaster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 一个客户端的实时通道。
///
/// 不实现 `Clone`：`join` 会拿走所有权，所以同一个连接不可能出现在两个会话里。
/// 注册表释放 `Connection` 时发送端随之释放，对端任务的 `recv()` 会返回 `None`。
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::Sender<String>,
}

impl Connection {
    /// 创建连接以及对应的待发送队列接收端
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            user_id,
            outbound: tx,
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conversations: DashMap<ConversationId, HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, conversation_id: ConversationId, connection: Connection) {
        let connection_id = connection.id;
        let user_id = connection.user_id;
        let mut peers = self.conversations.entry(conversation_id).or_default();
        peers.insert(connection_id, connection);
        debug!(
            %conversation_id,
            %connection_id,
            %user_id,
            peers = peers.len(),
            "连接加入会话"
        );
    }

    /// 移除连接；连接不存在时什么都不做并返回 `false`
    pub fn leave(&self, conversation_id: ConversationId, connection_id: ConnectionId) -> bool {
        match self.conversations.entry(conversation_id) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&connection_id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                }
                if removed {
                    debug!(%conversation_id, %connection_id, "连接离开会话");
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    pub fn broadcast(&self, conversation_id: ConversationId, payload: &str) -> BroadcastReport {
        self.broadcast_except(conversation_id, payload, None)
    }

    /// 向会话内除 `exclude` 之外的所有连接投递。
    ///
    /// 队列已关闭或已满的连接在同一个临界区内被移除。
    pub fn broadcast_except(
        &self,
        conversation_id: ConversationId,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Entry::Occupied(mut entry) = self.conversations.entry(conversation_id) else {
            return report;
        };

        entry.get_mut().retain(|connection_id, connection| {
            if Some(*connection_id) == exclude {
                return true;
            }
            match connection.outbound.try_send(payload.to_owned()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(err) => {
                    let reason = match err {
                        TrySendError::Full(_) => "outbound queue full",
                        TrySendError::Closed(_) => "peer disconnected",
                    };
                    warn!(
                        %conversation_id,
                        %connection_id,
                        user_id = %connection.user_id,
                        reason,
                        "投递失败，移除连接"
                    );
                    report.evicted.push(*connection_id);
                    false
                }
            }
        });

        if entry.get().is_empty() {
            entry.remove();
        }
        report
    }

    pub fn connection_count(&self, conversation_id: ConversationId) -> usize {
        self.conversations
            .get(&conversation_id)
            .map(|peers| peers.len())
            .unwrap_or(0)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn contains(&self, conversation_id: ConversationId, connection_id: ConnectionId) -> bool {
        self.conversations
            .get(&conversation_id)
            .is_some_and(|peers| peers.contains_key(&connection_id))
    }

    /// 关闭所有连接（停机时调用），返回被关闭的连接数
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        self.conversations.retain(|_, peers| {
            closed += peers.len();
            false
        });
        closed
    }
}

impl MessageBroadcaster for ConnectionRegistry {
    fn broadcast(
        &self,
        conversation_id: ConversationId,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport {
        self.broadcast_except(conversation_id, payload, exclude)
    }
}
