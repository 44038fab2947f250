//! 消息入口：校验 -> 鉴权 -> 持久化 -> 广播
//!
//! 同一会话内的调用按到达顺序串行执行（持久化与广播在同一把锁内），
//! 因此广播顺序与存储分配的消息 ID 顺序一致。

use std::sync::Arc;

use dashmap::DashMap;
use domain::{ConversationId, DomainError, Message, MessageText, NewMessage, UserId};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{
    broadcaster::MessageBroadcaster,
    dto::MessageDto,
    error::ApplicationError,
    registry::ConnectionId,
    repository::{ConversationRepository, MessageRepository},
};

pub struct MessageIngressDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
}

pub struct MessageIngress {
    deps: MessageIngressDependencies,
    locks: DashMap<ConversationId, Arc<Mutex<()>>>,
}

impl MessageIngress {
    pub fn new(deps: MessageIngressDependencies) -> Self {
        Self {
            deps,
            locks: DashMap::new(),
        }
    }

    /// 处理一条入站消息。
    ///
    /// `origin` 为消息到达的实时连接，广播时会跳过它；HTTP 发送时为 `None`。
    /// 校验或鉴权失败时既不写库也不广播；写库失败直接返回，不会广播。
    pub async fn handle_incoming(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: impl Into<String>,
        origin: Option<ConnectionId>,
    ) -> Result<Message, ApplicationError> {
        let text = MessageText::new(text)?;

        let (user1_id, user2_id) = self
            .deps
            .conversation_repository
            .participants(conversation_id)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;
        if sender_id != user1_id && sender_id != user2_id {
            return Err(DomainError::NotParticipant.into());
        }

        let slot = ConversationSlot::enter(&self.locks, conversation_id);
        let _guard = slot.lock.lock().await;
        self.persist_and_broadcast(conversation_id, sender_id, text, origin)
            .await
    }

    async fn persist_and_broadcast(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: MessageText,
        origin: Option<ConnectionId>,
    ) -> Result<Message, ApplicationError> {
        let message = self
            .deps
            .message_repository
            .create(NewMessage {
                conversation_id,
                sender_id,
                text,
            })
            .await?;

        match serde_json::to_string(&MessageDto::from(&message)) {
            Ok(payload) => {
                let report = self
                    .deps
                    .broadcaster
                    .broadcast(conversation_id, &payload, origin);
                debug!(
                    %conversation_id,
                    message_id = %message.id,
                    delivered = report.delivered,
                    evicted = report.evicted.len(),
                    "消息已广播"
                );
            }
            // 消息已落库，序列化失败只影响实时推送
            Err(err) => error!(
                %conversation_id,
                message_id = %message.id,
                error = %err,
                "序列化消息失败，跳过广播"
            ),
        }

        Ok(message)
    }

    /// 当前持有或等待锁的会话数
    pub fn active_conversations(&self) -> usize {
        self.locks.len()
    }
}

/// 某个会话锁的一次占用；释放时（包括调用被取消）清理无人使用的表项
struct ConversationSlot<'a> {
    locks: &'a DashMap<ConversationId, Arc<Mutex<()>>>,
    conversation_id: ConversationId,
    lock: Arc<Mutex<()>>,
}

impl<'a> ConversationSlot<'a> {
    fn enter(
        locks: &'a DashMap<ConversationId, Arc<Mutex<()>>>,
        conversation_id: ConversationId,
    ) -> Self {
        let lock = Arc::clone(
            locks
                .entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        Self {
            locks,
            conversation_id,
            lock,
        }
    }
}

impl Drop for ConversationSlot<'_> {
    fn drop(&mut self) {
        // 仅剩表项与本次占用时移除
        self.locks.remove_if(&self.conversation_id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use domain::RepositoryError;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::broadcaster::BroadcastReport;
    use crate::error::ErrorKind;
    use crate::memory::InMemoryStore;
    use crate::registry::{Connection, ConnectionRegistry};

    #[derive(Default)]
    struct RecordingBroadcaster {
        calls: StdMutex<Vec<(ConversationId, String, Option<ConnectionId>)>>,
    }

    impl RecordingBroadcaster {
        fn calls(&self) -> Vec<(ConversationId, String, Option<ConnectionId>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl MessageBroadcaster for RecordingBroadcaster {
        fn broadcast(
            &self,
            conversation_id: ConversationId,
            payload: &str,
            exclude: Option<ConnectionId>,
        ) -> BroadcastReport {
            self.calls
                .lock()
                .unwrap()
                .push((conversation_id, payload.to_owned(), exclude));
            BroadcastReport::default()
        }
    }

    struct BrokenMessages;

    #[async_trait]
    impl MessageRepository for BrokenMessages {
        async fn create(&self, _message: NewMessage) -> Result<Message, RepositoryError> {
            Err(RepositoryError::storage("disk full"))
        }

        async fn list_by_conversation(
            &self,
            _conversation_id: ConversationId,
        ) -> Result<Vec<Message>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    /// 写库前等待放行
    struct GatedMessages {
        inner: Arc<InMemoryStore>,
        gate: Semaphore,
    }

    #[async_trait]
    impl MessageRepository for GatedMessages {
        async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| RepositoryError::storage("gate closed"))?;
            MessageRepository::create(self.inner.as_ref(), message).await
        }

        async fn list_by_conversation(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Vec<Message>, RepositoryError> {
            self.inner.list_by_conversation(conversation_id).await
        }
    }

    async fn store_with_conversation() -> (Arc<InMemoryStore>, ConversationId) {
        let store = Arc::new(InMemoryStore::new());
        let conversation = ConversationRepository::create(
            store.as_ref(),
            UserId::new(1),
            UserId::new(2),
        )
        .await
        .unwrap();
        (store, conversation.id)
    }

    fn ingress(
        store: &Arc<InMemoryStore>,
        broadcaster: Arc<dyn MessageBroadcaster>,
    ) -> MessageIngress {
        MessageIngress::new(MessageIngressDependencies {
            conversation_repository: store.clone(),
            message_repository: store.clone(),
            broadcaster,
        })
    }

    #[tokio::test]
    async fn persisted_message_is_broadcast_without_the_origin() {
        let (store, conversation_id) = store_with_conversation().await;
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ingress = ingress(&store, broadcaster.clone());
        let origin = ConnectionId::new();

        let message = ingress
            .handle_incoming(conversation_id, UserId::new(1), "hello", Some(origin))
            .await
            .unwrap();

        assert_eq!(message.text.as_str(), "hello");
        assert_eq!(store.message_count().await, 1);

        let calls = broadcaster.calls();
        assert_eq!(calls.len(), 1);
        let (target, payload, exclude) = &calls[0];
        assert_eq!(*target, conversation_id);
        assert_eq!(*exclude, Some(origin));

        let dto: MessageDto = serde_json::from_str(payload).unwrap();
        assert_eq!(dto.message_id, message.id);
        assert_eq!(dto.message_text, "hello");
        assert_eq!(dto.sender_id, UserId::new(1));
    }

    #[tokio::test]
    async fn non_participant_is_forbidden_and_nothing_happens() {
        let (store, conversation_id) = store_with_conversation().await;
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ingress = ingress(&store, broadcaster.clone());

        let err = ingress
            .handle_incoming(conversation_id, UserId::new(3), "intruder", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(store.message_count().await, 0);
        assert!(broadcaster.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let (store, _) = store_with_conversation().await;
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ingress = ingress(&store, broadcaster.clone());

        let err = ingress
            .handle_incoming(ConversationId::new(999), UserId::new(1), "hi", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(broadcaster.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_any_lookup() {
        let (store, conversation_id) = store_with_conversation().await;
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ingress = ingress(&store, broadcaster.clone());

        let err = ingress
            .handle_incoming(conversation_id, UserId::new(1), "   ", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(store.message_count().await, 0);
        assert!(broadcaster.calls().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_surfaced_and_not_broadcast() {
        let (store, conversation_id) = store_with_conversation().await;
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ingress = MessageIngress::new(MessageIngressDependencies {
            conversation_repository: store.clone(),
            message_repository: Arc::new(BrokenMessages),
            broadcaster: broadcaster.clone(),
        });

        let err = ingress
            .handle_incoming(conversation_id, UserId::new(2), "lost", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(broadcaster.calls().is_empty());
        assert_eq!(ingress.active_conversations(), 0);
    }

    #[tokio::test]
    async fn cancelled_send_releases_conversation_lock() {
        let (store, conversation_id) = store_with_conversation().await;
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let gated = Arc::new(GatedMessages {
            inner: store.clone(),
            gate: Semaphore::new(0),
        });
        let ingress = MessageIngress::new(MessageIngressDependencies {
            conversation_repository: store.clone(),
            message_repository: gated.clone(),
            broadcaster: broadcaster.clone(),
        });

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            ingress.handle_incoming(conversation_id, UserId::new(1), "stuck", None),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(ingress.active_conversations(), 0);
        assert!(broadcaster.calls().is_empty());

        gated.gate.add_permits(1);
        ingress
            .handle_incoming(conversation_id, UserId::new(1), "next", None)
            .await
            .unwrap();
        assert_eq!(store.message_count().await, 1);
        assert_eq!(ingress.active_conversations(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_keep_lock_alive() {
        let (store, conversation_id) = store_with_conversation().await;
        let gated = Arc::new(GatedMessages {
            inner: store.clone(),
            gate: Semaphore::new(0),
        });
        let ingress = Arc::new(MessageIngress::new(MessageIngressDependencies {
            conversation_repository: store.clone(),
            message_repository: gated.clone(),
            broadcaster: Arc::new(RecordingBroadcaster::default()),
        }));

        let holder = {
            let ingress = Arc::clone(&ingress);
            tokio::spawn(async move {
                ingress
                    .handle_incoming(conversation_id, UserId::new(1), "first", None)
                    .await
            })
        };
        while ingress.active_conversations() == 0 {
            tokio::task::yield_now().await;
        }

        let waiter = tokio::time::timeout(
            Duration::from_millis(20),
            ingress.handle_incoming(conversation_id, UserId::new(2), "second", None),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(ingress.active_conversations(), 1);

        gated.gate.add_permits(1);
        holder.await.unwrap().unwrap();
        assert_eq!(ingress.active_conversations(), 0);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_are_broadcast_in_id_order() {
        let (store, conversation_id) = store_with_conversation().await;
        let registry = Arc::new(ConnectionRegistry::new());
        let (listener, mut rx) = Connection::new(UserId::new(2), 128);
        registry.join(conversation_id, listener);
        let ingress = Arc::new(ingress(&store, registry.clone()));

        let mut handles = Vec::new();
        for i in 0..32 {
            let ingress = Arc::clone(&ingress);
            handles.push(tokio::spawn(async move {
                ingress
                    .handle_incoming(conversation_id, UserId::new(1), format!("m{i}"), None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut received = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let dto: MessageDto = serde_json::from_str(&frame).unwrap();
            received.push(dto.message_id);
        }
        assert_eq!(received.len(), 32);
        assert!(received.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ingress.active_conversations(), 0);
    }
}
