//! 实时连接生命周期
//!
//! `Connecting -> Joined -> (Closing | Failed) -> Closed`

use std::sync::Arc;

use domain::{ConversationId, UserId};
use tracing::{info, warn};

use crate::error::ApplicationError;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Joined,
    Closing,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Joined)
                | (Connecting, Closing)
                | (Connecting, Failed)
                | (Joined, Closing)
                | (Joined, Failed)
                | (Closing, Failed)
                | (Closing, Closed)
                | (Failed, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

/// 驱动单个连接的状态迁移，并负责在注册表中登记和注销。
///
/// 任务被取消或 panic 时 `Drop` 兜底执行 `leave`。
pub struct ConnectionSession {
    registry: Arc<ConnectionRegistry>,
    conversation_id: ConversationId,
    user_id: UserId,
    connection_id: Option<ConnectionId>,
    state: ConnectionState,
}

impl ConnectionSession {
    pub fn begin(
        registry: Arc<ConnectionRegistry>,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Self {
        Self {
            registry,
            conversation_id,
            user_id,
            connection_id: None,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn join(&mut self, connection: Connection) -> Result<ConnectionId, ApplicationError> {
        if connection.user_id() != self.user_id {
            return Err(ApplicationError::Connection(
                "connection belongs to another user".into(),
            ));
        }
        self.transition(ConnectionState::Joined)?;
        let connection_id = connection.id();
        self.connection_id = Some(connection_id);
        self.registry.join(self.conversation_id, connection);
        info!(
            conversation_id = %self.conversation_id,
            %connection_id,
            user_id = %self.user_id,
            "实时连接已建立"
        );
        Ok(connection_id)
    }

    /// 正常关闭（客户端关闭或流结束）
    pub fn close(&mut self) {
        if self.transition(ConnectionState::Closing).is_err() {
            return;
        }
        self.finish();
    }

    /// 传输错误或被注册表移除
    pub fn fail(&mut self, reason: &str) {
        if self.transition(ConnectionState::Failed).is_err() {
            return;
        }
        warn!(
            conversation_id = %self.conversation_id,
            connection_id = ?self.connection_id,
            user_id = %self.user_id,
            reason,
            "实时连接异常终止"
        );
        self.finish();
    }

    fn finish(&mut self) {
        self.release();
        self.state = ConnectionState::Closed;
        info!(
            conversation_id = %self.conversation_id,
            connection_id = ?self.connection_id,
            user_id = %self.user_id,
            "实时连接已关闭"
        );
    }

    fn release(&self) {
        if let Some(connection_id) = self.connection_id {
            self.registry.leave(self.conversation_id, connection_id);
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Result<(), ApplicationError> {
        if !self.state.can_transition_to(next) {
            return Err(ApplicationError::Connection(format!(
                "invalid transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.release();
        }
    }
}
