//! 主应用程序入口
//!
//! 加载配置、连接基础设施，启动 Axum Web API 与 WebSocket 服务。

use std::{sync::Arc, time::Duration};

use application::{
    ConnectionRegistry, ConversationService, ConversationServiceDependencies, MessageIngress,
    MessageIngressDependencies, PasswordResetService, PasswordResetServiceDependencies,
    SystemClock, UserService, UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService, WebSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置加载完成");
    if config.uses_development_secret() {
        tracing::warn!("正在使用内置开发 JWT 密钥，生产环境请设置 APP_JWT__SECRET");
    }

    let infra = Infrastructure::connect(&config).await?;
    let storage = infra.storage.clone();
    let clock = Arc::new(SystemClock);

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: storage.user_repository.clone(),
        password_hasher: infra.password_hasher_trait(),
        image_store: infra.image_store.clone(),
        clock: clock.clone(),
        default_profile_image_url: config.storage.default_profile_image_url.clone(),
        max_image_bytes: config.storage.max_image_bytes,
    });
    let conversation_service = ConversationService::new(ConversationServiceDependencies {
        user_repository: storage.user_repository.clone(),
        conversation_repository: storage.conversation_repository.clone(),
        message_repository: storage.message_repository.clone(),
        default_profile_image_url: config.storage.default_profile_image_url.clone(),
    });
    let password_reset_service = Arc::new(PasswordResetService::new(
        PasswordResetServiceDependencies {
            user_repository: storage.user_repository.clone(),
            reset_repository: storage.reset_repository.clone(),
            password_hasher: infra.password_hasher_trait(),
            mailer: infra.mailer_trait(),
            clock,
            token_ttl: chrono::Duration::minutes(config.password_reset.otp_ttl_minutes),
        },
    ));

    let registry = Arc::new(ConnectionRegistry::new());
    let ingress = MessageIngress::new(MessageIngressDependencies {
        conversation_repository: storage.conversation_repository.clone(),
        message_repository: storage.message_repository.clone(),
        broadcaster: registry.clone(),
    });

    spawn_reset_token_purge(
        password_reset_service.clone(),
        Duration::from_secs(config.password_reset.purge_interval_seconds),
    );

    let state = AppState {
        user_service: Arc::new(user_service),
        conversation_service: Arc::new(conversation_service),
        password_reset_service,
        ingress: Arc::new(ingress),
        registry: registry.clone(),
        jwt_service: Arc::new(JwtService::new(config.jwt.clone())),
        settings: WebSettings::from_config(&config),
    };

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("BUZZ 服务器启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = registry.close_all();
    tracing::info!(closed, "服务器已关闭");
    Ok(())
}

/// 定期清理过期的密码重置验证码
fn spawn_reset_token_purge(service: Arc<PasswordResetService>, every: Duration) {
    if every.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match service.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "已清理过期验证码"),
                Err(err) => tracing::warn!(error = %err, "清理过期验证码失败"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
    }
    tracing::info!("收到退出信号，开始关闭");
}
