//! 内存存储实现，用于测试和本地开发

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    Conversation, ConversationId, Message, MessageId, NewMessage, NewUser, PasswordHash,
    PasswordResetToken, RepositoryError, Timestamp, User, UserEmail, UserId, Username,
};
use tokio::sync::RwLock;

use crate::repository::{
    ConversationRepository, MessageRepository, PasswordResetRepository, UserRepository,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: Vec<Message>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    next_user_id: i64,
    next_conversation_id: i64,
    next_message_id: i64,
}

/// 同时实现全部仓储接口的内存存储
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn reset_token_count(&self) -> usize {
        self.state.read().await.reset_tokens.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::conflict("username"));
        }
        if let Some(email) = &user.email {
            if state.users.values().any(|u| u.email.as_ref() == Some(email)) {
                return Err(RepositoryError::conflict("email"));
            }
        }

        state.next_user_id += 1;
        let stored = User {
            id: UserId::new(state.next_user_id),
            username: user.username,
            email: user.email,
            password: user.password,
            profile_image_url: None,
            created_at: user.created_at,
        };
        state.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| &u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.as_ref() == Some(email))
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        let mut users: Vec<User> = ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect();
        users.sort_by_key(|u| u.id);
        users.dedup_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_profile_image(&self, id: UserId, url: &str) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.profile_image_url = Some(url.to_owned());
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        id: UserId,
        password: PasswordHash,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.password = password;
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn create(
        &self,
        user1_id: UserId,
        user2_id: UserId,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.state.write().await;
        let key = Conversation::pair_key(user1_id, user2_id);
        if let Some(existing) = state
            .conversations
            .values()
            .find(|c| Conversation::pair_key(c.user1_id, c.user2_id) == key)
        {
            return Ok(existing.clone());
        }

        state.next_conversation_id += 1;
        let conversation = Conversation {
            id: ConversationId::new(state.next_conversation_id),
            user1_id,
            user2_id,
            created_at: Utc::now(),
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let key = Conversation::pair_key(a, b);
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .find(|c| Conversation::pair_key(c.user1_id, c.user2_id) == key)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by_key(|c| c.id);
        Ok(conversations)
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(RepositoryError::NotFound);
        }
        state.next_message_id += 1;
        let stored = Message {
            id: MessageId::new(state.next_message_id),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            text: message.text,
            sent_at: Utc::now(),
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PasswordResetRepository for InMemoryStore {
    async fn store(&self, token: PasswordResetToken) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.reset_tokens.get(&token.token) {
            if existing.user_id != token.user_id {
                return Err(RepositoryError::conflict("reset token"));
            }
        }
        state
            .reset_tokens
            .retain(|_, existing| existing.user_id != token.user_id);
        state.reset_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<PasswordResetToken>, RepositoryError> {
        Ok(self.state.write().await.reset_tokens.remove(token))
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.reset_tokens.len();
        state.reset_tokens.retain(|_, token| !token.is_expired(now));
        Ok((before - state.reset_tokens.len()) as u64)
    }
}
