use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: Option<UserEmail>,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub profile_image_url: Option<String>,
    pub created_at: Timestamp,
}

impl User {
    pub fn has_profile_image(&self) -> bool {
        self.profile_image_url
            .as_deref()
            .is_some_and(|url| !url.is_empty())
    }
}

/// 待持久化的新用户，ID 由存储层分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: Username,
    pub email: Option<UserEmail>,
    pub password: PasswordHash,
    pub created_at: Timestamp,
}
