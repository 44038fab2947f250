use std::sync::Arc;

use domain::{Conversation, ConversationId, DomainError, Message, User, UserId, Username};

use crate::{
    dto::ConversationPartnerDto,
    error::ApplicationError,
    repository::{ConversationRepository, MessageRepository, UserRepository},
};

pub struct ConversationServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub default_profile_image_url: String,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 与指定用户开启会话；已存在时直接返回原会话
    pub async fn start(
        &self,
        user_id: UserId,
        recipient_username: &str,
    ) -> Result<Conversation, ApplicationError> {
        let recipient = self.find_recipient(recipient_username).await?;
        Conversation::check_participants(user_id, recipient.id)?;

        if let Some(existing) = self
            .deps
            .conversation_repository
            .find_between(user_id, recipient.id)
            .await?
        {
            return Ok(existing);
        }

        let conversation = self
            .deps
            .conversation_repository
            .create(user_id, recipient.id)
            .await?;
        tracing::info!(
            conversation_id = %conversation.id,
            %user_id,
            recipient_id = %recipient.id,
            "会话已创建"
        );
        Ok(conversation)
    }

    pub async fn conversation_id_with(
        &self,
        user_id: UserId,
        recipient_username: &str,
    ) -> Result<ConversationId, ApplicationError> {
        let recipient = self.find_recipient(recipient_username).await?;
        self.deps
            .conversation_repository
            .find_between(user_id, recipient.id)
            .await?
            .map(|conversation| conversation.id)
            .ok_or_else(|| DomainError::ConversationNotFound.into())
    }

    /// 加载会话并确认用户是参与者（实时连接升级前调用）
    pub async fn authorize(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Conversation, ApplicationError> {
        let conversation = self
            .deps
            .conversation_repository
            .find_by_id(conversation_id)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;
        conversation.ensure_participant(user_id)?;
        Ok(conversation)
    }

    /// 会话历史，按消息 ID 升序
    pub async fn history(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.authorize(conversation_id, user_id).await?;
        let messages = self
            .deps
            .message_repository
            .list_by_conversation(conversation_id)
            .await?;
        Ok(messages)
    }

    /// 所有与当前用户有会话的对方用户
    pub async fn partners(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationPartnerDto>, ApplicationError> {
        let conversations = self
            .deps
            .conversation_repository
            .list_for_user(user_id)
            .await?;
        let partner_ids: Vec<UserId> = conversations
            .iter()
            .filter_map(|conversation| conversation.other_participant(user_id))
            .collect();
        if partner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = self.deps.user_repository.find_by_ids(&partner_ids).await?;
        Ok(users
            .into_iter()
            .map(|user| ConversationPartnerDto {
                profile_image_url: self.profile_image_or_default(&user),
                user_id: user.id,
                username: user.username.as_str().to_owned(),
            })
            .collect())
    }

    async fn find_recipient(&self, recipient_username: &str) -> Result<User, ApplicationError> {
        let username = Username::parse(recipient_username)?;
        self.deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or_else(|| DomainError::UserNotFound.into())
    }

    fn profile_image_or_default(&self, user: &User) -> String {
        match &user.profile_image_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => self.deps.default_profile_image_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::{MessageText, NewMessage, NewUser, PasswordHash};

    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::InMemoryStore;

    const PLACEHOLDER: &str = "/static/default-placeholder.png";

    async fn add_user(store: &InMemoryStore, name: &str) -> User {
        UserRepository::create(
            store,
            NewUser {
                username: Username::parse(name).unwrap(),
                email: None,
                password: PasswordHash::new("hash").unwrap(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap()
    }

    fn service(store: &Arc<InMemoryStore>) -> ConversationService {
        ConversationService::new(ConversationServiceDependencies {
            user_repository: store.clone(),
            conversation_repository: store.clone(),
            message_repository: store.clone(),
            default_profile_image_url: PLACEHOLDER.into(),
        })
    }

    #[tokio::test]
    async fn start_is_idempotent_for_either_direction() {
        let store = Arc::new(InMemoryStore::new());
        let alice = add_user(&store, "alice").await;
        let bob = add_user(&store, "bob").await;
        let service = service(&store);

        let first = service.start(alice.id, "bob").await.unwrap();
        let again = service.start(alice.id, "bob").await.unwrap();
        let reverse = service.start(bob.id, "alice").await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(first.id, reverse.id);
        assert_eq!(
            service.conversation_id_with(bob.id, "alice").await.unwrap(),
            first.id
        );
    }

    #[tokio::test]
    async fn unknown_recipient_and_self_are_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let alice = add_user(&store, "alice").await;
        let service = service(&store);

        let err = service.start(alice.id, "ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service.start(alice.id, "alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn conversation_id_lookup_without_conversation_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let alice = add_user(&store, "alice").await;
        add_user(&store, "bob").await;
        let service = service(&store);

        let err = service.conversation_id_with(alice.id, "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn history_is_restricted_to_participants() {
        let store = Arc::new(InMemoryStore::new());
        let alice = add_user(&store, "alice").await;
        add_user(&store, "bob").await;
        let mallory = add_user(&store, "mallory").await;
        let service = service(&store);
        let conversation = service.start(alice.id, "bob").await.unwrap();

        for text in ["one", "two"] {
            MessageRepository::create(
                store.as_ref(),
                NewMessage {
                    conversation_id: conversation.id,
                    sender_id: alice.id,
                    text: MessageText::new(text).unwrap(),
                },
            )
            .await
            .unwrap();
        }

        let history = service.history(conversation.id, alice.id).await.unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);

        let err = service.history(conversation.id, mallory.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn partners_fall_back_to_placeholder_image() {
        let store = Arc::new(InMemoryStore::new());
        let alice = add_user(&store, "alice").await;
        let bob = add_user(&store, "bob").await;
        let carol = add_user(&store, "carol").await;
        store
            .update_profile_image(carol.id, "https://images.test/carol.png")
            .await
            .unwrap();
        let service = service(&store);
        service.start(alice.id, "bob").await.unwrap();
        service.start(carol.id, "alice").await.unwrap();

        let partners = service.partners(alice.id).await.unwrap();

        assert_eq!(partners.len(), 2);
        let bob_entry = partners.iter().find(|p| p.user_id == bob.id).unwrap();
        assert_eq!(bob_entry.profile_image_url, PLACEHOLDER);
        let carol_entry = partners.iter().find(|p| p.user_id == carol.id).unwrap();
        assert_eq!(carol_entry.profile_image_url, "https://images.test/carol.png");
    }
}
