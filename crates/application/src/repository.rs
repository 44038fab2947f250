use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Message, NewMessage, NewUser, PasswordHash, PasswordResetToken,
    RepositoryError, Timestamp, User, UserEmail, UserId, Username,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 用户名或邮箱重复时返回 `RepositoryError::Conflict`
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username)
        -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
    async fn update_profile_image(&self, id: UserId, url: &str) -> Result<User, RepositoryError>;
    async fn update_password(
        &self,
        id: UserId,
        password: PasswordHash,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 同一对用户已有会话时返回已有的那一个
    async fn create(
        &self,
        user1_id: UserId,
        user2_id: UserId,
    ) -> Result<Conversation, RepositoryError>;
    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;
    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError>;

    async fn participants(
        &self,
        id: ConversationId,
    ) -> Result<Option<(UserId, UserId)>, RepositoryError> {
        Ok(self.find_by_id(id).await?.map(|conv| conv.participants()))
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 写入即持久化，返回带有存储层分配 ID 和时间的消息
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    /// 按消息 ID 升序返回
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    /// 保存令牌，同时作废该用户此前未使用的令牌。
    ///
    /// 令牌值已被其他用户占用时返回 `Conflict`，不改动任何已有令牌。
    async fn store(&self, token: PasswordResetToken) -> Result<(), RepositoryError>;

    /// 取出并删除令牌（一次性）
    async fn take(&self, token: &str) -> Result<Option<PasswordResetToken>, RepositoryError>;

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, RepositoryError>;
}
