use std::sync::Arc;

use domain::{DomainError, NewUser, RepositoryError, User, UserEmail, UserId, Username};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::ApplicationError,
    image_store::ProfileImageStore,
    password::{validate_new_password, PasswordHasher},
    repository::UserRepository,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProfileImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub image_store: Arc<dyn ProfileImageStore>,
    pub clock: Arc<dyn Clock>,
    pub default_profile_image_url: String,
    pub max_image_bytes: usize,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username)?;
        let email = match request.email.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(UserEmail::parse(raw)?),
            _ => None,
        };
        validate_new_password("password", &request.password)?;

        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::already_exists("username").into());
        }
        if let Some(email) = &email {
            if self
                .deps
                .user_repository
                .find_by_email(email)
                .await?
                .is_some()
            {
                return Err(DomainError::already_exists("email").into());
            }
        }

        let password = self.deps.password_hasher.hash(&request.password).await?;
        let new_user = NewUser {
            username,
            email,
            password,
            created_at: self.deps.clock.now(),
        };

        // 并发注册时由唯一索引兜底
        match self.deps.user_repository.create(new_user).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "用户注册成功");
                Ok(user)
            }
            Err(RepositoryError::Conflict(field)) => {
                Err(DomainError::already_exists(field).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<User, ApplicationError> {
        if request.username.trim().is_empty() || request.password.is_empty() {
            return Err(DomainError::invalid_argument(
                "credentials",
                "username and password cannot be empty",
            )
            .into());
        }
        let username =
            Username::parse(request.username).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        Ok(user)
    }

    pub async fn get(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound.into())
    }

    /// 上传头像并返回新的 URL
    pub async fn update_profile_image(
        &self,
        user_id: UserId,
        upload: ProfileImageUpload,
    ) -> Result<String, ApplicationError> {
        if !upload.content_type.starts_with("image/") {
            return Err(
                DomainError::invalid_argument("file", "only image uploads are accepted").into(),
            );
        }
        if upload.bytes.is_empty() {
            return Err(DomainError::invalid_argument("file", "cannot be empty").into());
        }
        if upload.bytes.len() > self.deps.max_image_bytes {
            return Err(DomainError::invalid_argument("file", "image is too large").into());
        }

        let key = format!(
            "profile-images/{}/{}.{}",
            user_id,
            Uuid::new_v4(),
            extension_for(&upload.content_type, upload.file_name.as_deref())
        );
        let url = self
            .deps
            .image_store
            .put(&key, &upload.content_type, upload.bytes)
            .await?;
        self.deps
            .user_repository
            .update_profile_image(user_id, &url)
            .await?;

        tracing::info!(%user_id, "头像已更新");
        Ok(url)
    }

    /// 用户头像；未设置时返回默认占位图
    pub fn profile_image_url(&self, user: &User) -> String {
        if user.has_profile_image() {
            user.profile_image_url.clone().unwrap_or_default()
        } else {
            self.deps.default_profile_image_url.clone()
        }
    }
}

fn extension_for(content_type: &str, file_name: Option<&str>) -> String {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    if let Some(ext) = from_name {
        return ext;
    }
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "img",
    }
    .to_owned()
}
