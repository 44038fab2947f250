use std::sync::Arc;

use application::{
    ConnectionRegistry, ConversationService, MessageIngress, PasswordResetService, UserService,
};
use config::AppConfig;

use crate::JwtService;

/// 路由层需要的配置项
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub outbound_queue_capacity: usize,
    pub max_image_bytes: usize,
    /// 本地头像目录，配置后挂载到 `/static`
    pub static_dir: Option<String>,
    pub cors_origins: Vec<String>,
}

impl WebSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let static_dir = match config.storage.backend {
            config::StorageBackend::Local => Some(config.storage.local_dir.clone()),
            config::StorageBackend::S3 => None,
        };
        Self {
            outbound_queue_capacity: config.realtime.outbound_queue_capacity,
            max_image_bytes: config.storage.max_image_bytes,
            static_dir,
            cors_origins: config.server.cors_origins.clone(),
        }
    }
}

impl Default for WebSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub conversation_service: Arc<ConversationService>,
    pub password_reset_service: Arc<PasswordResetService>,
    pub ingress: Arc<MessageIngress>,
    pub registry: Arc<ConnectionRegistry>,
    pub jwt_service: Arc<JwtService>,
    pub settings: WebSettings,
}
