use std::sync::Arc;
use std::time::Duration;

use application::repository::{
    ConversationRepository, MessageRepository, PasswordResetRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Conversation, ConversationId, Message, MessageId, MessageText, NewMessage, NewUser,
    PasswordHash, PasswordResetToken, RepositoryError, Timestamp, User, UserEmail, UserId,
    Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let field = match db.constraint() {
                Some(name) if name.contains("email") => "email",
                Some(name) if name.contains("username") => "username",
                Some(name) => name,
                None => "record",
            };
            return RepositoryError::conflict(field);
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    user_id: i64,
    username: String,
    email: Option<String>,
    password_hash: String,
    profile_image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username =
            Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let email = value
            .email
            .map(UserEmail::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::new(value.user_id),
            username,
            email,
            password,
            profile_image_url: value.profile_image_url,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ConversationRecord {
    conversation_id: i64,
    user1_id: i64,
    user2_id: i64,
    created_at: DateTime<Utc>,
}

impl From<ConversationRecord> for Conversation {
    fn from(value: ConversationRecord) -> Self {
        Conversation {
            id: ConversationId::new(value.conversation_id),
            user1_id: UserId::new(value.user1_id),
            user2_id: UserId::new(value.user2_id),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    message_id: i64,
    conversation_id: i64,
    sender_id: i64,
    message_text: String,
    sent_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let text =
            MessageText::new(value.message_text).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::new(value.message_id),
            conversation_id: ConversationId::new(value.conversation_id),
            sender_id: UserId::new(value.sender_id),
            text,
            sent_at: value.sent_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ResetTokenRecord {
    token: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
}

impl From<ResetTokenRecord> for PasswordResetToken {
    fn from(value: ResetTokenRecord) -> Self {
        PasswordResetToken {
            token: value.token,
            user_id: UserId::new(value.user_id),
            expires_at: value.expires_at,
        }
    }
}

const USER_COLUMNS: &str = "user_id, username, email, password_hash, profile_image_url, created_at";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.username.as_str())
        .bind(user.email.as_ref().map(|email| email.as_str()))
        .bind(user.password.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ANY($1) ORDER BY user_id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }

    async fn update_profile_image(&self, id: UserId, url: &str) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users SET profile_image_url = $2
            WHERE user_id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id.value())
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        User::try_from(record)
    }

    async fn update_password(
        &self,
        id: UserId,
        password: PasswordHash,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE user_id = $1")
            .bind(id.value())
            .bind(password.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(
        &self,
        user1_id: UserId,
        user2_id: UserId,
    ) -> Result<Conversation, RepositoryError> {
        let inserted = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (user1_id, user2_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING conversation_id, user1_id, user2_id, created_at
            "#,
        )
        .bind(user1_id.value())
        .bind(user2_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match inserted {
            Some(record) => Ok(record.into()),
            // 并发创建时唯一索引冲突，返回已存在的会话
            None => self
                .find_between(user1_id, user2_id)
                .await?
                .ok_or(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT conversation_id, user1_id, user2_id, created_at
            FROM conversations
            WHERE conversation_id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Conversation::from))
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT conversation_id, user1_id, user2_id, created_at
            FROM conversations
            WHERE LEAST(user1_id, user2_id) = LEAST($1::BIGINT, $2::BIGINT)
              AND GREATEST(user1_id, user2_id) = GREATEST($1::BIGINT, $2::BIGINT)
            "#,
        )
        .bind(a.value())
        .bind(b.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Conversation::from))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT conversation_id, user1_id, user2_id, created_at
            FROM conversations
            WHERE user1_id = $1 OR user2_id = $1
            ORDER BY conversation_id
            "#,
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Conversation::from).collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (conversation_id, sender_id, message_text)
            VALUES ($1, $2, $3)
            RETURNING message_id, conversation_id, sender_id, message_text, sent_at
            "#,
        )
        .bind(message.conversation_id.value())
        .bind(message.sender_id.value())
        .bind(message.text.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT message_id, conversation_id, sender_id, message_text, sent_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY message_id ASC
            "#,
        )
        .bind(conversation_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgPasswordResetRepository {
    pool: PgPool,
}

impl PgPasswordResetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasswordResetRepository for PgPasswordResetRepository {
    async fn store(&self, token: PasswordResetToken) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(token.user_id.value())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        sqlx::query(
            "INSERT INTO password_reset_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&token.token)
        .bind(token.user_id.value())
        .bind(token.expires_at)
        .execute(&mut *tx)
        .await
        // 主键冲突说明令牌值属于其他用户；事务回滚，原有令牌保持不变
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)
    }

    async fn take(&self, token: &str) -> Result<Option<PasswordResetToken>, RepositoryError> {
        let record = sqlx::query_as::<_, ResetTokenRecord>(
            r#"
            DELETE FROM password_reset_tokens
            WHERE token = $1
            RETURNING token, user_id, expires_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(PasswordResetToken::from))
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub reset_repository: Arc<PgPasswordResetRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            reset_repository: Arc::new(PgPasswordResetRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}
