#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use application::{
    memory::InMemoryStore, ConnectionRegistry, ConversationService,
    ConversationServiceDependencies, ImageStoreError, MailError, Mailer, MessageIngress,
    MessageIngressDependencies, OutgoingEmail, PasswordResetService,
    PasswordResetServiceDependencies, ProfileImageStore, SystemClock, UserService,
    UserServiceDependencies,
};
use infrastructure::BcryptPasswordHasher;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};
use web_api::{router, AppState, JwtConfig, JwtService, WebSettings};

pub const PLACEHOLDER_IMAGE: &str = "/static/default-placeholder.png";

/// 记录所有外发邮件
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryImageStore {
    pub objects: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait::async_trait]
impl ProfileImageStore for MemoryImageStore {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ImageStoreError> {
        self.objects
            .lock()
            .unwrap()
            .push((key.to_owned(), content_type.to_owned(), bytes.len()));
        Ok(format!("https://images.test/{key}"))
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub mailer: Arc<RecordingMailer>,
    pub images: Arc<MemoryImageStore>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, conversation_id: i64, token: &str) -> String {
        format!(
            "ws://{}/ws/conversations/{}?token={}",
            self.addr, conversation_id, token
        )
    }

    /// 注册用户并返回响应 JSON
    pub async fn register(&self, username: &str, email: Option<&str>) -> Value {
        let response = self
            .client
            .post(self.url("/create-user"))
            .json(&json!({
                "username": username,
                "email": email,
                "password": "secret-password",
            }))
            .send()
            .await
            .expect("create user");
        assert_eq!(response.status(), 201, "register {username}");
        response.json().await.expect("user json")
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .expect("token request")
    }

    pub async fn token(&self, username: &str) -> String {
        let body: Value = self
            .login(username, "secret-password")
            .await
            .json()
            .await
            .expect("token json");
        body["access_token"]
            .as_str()
            .expect("access_token")
            .to_owned()
    }

    /// 注册两个用户并建立会话，返回 (a_token, b_token, conversation_id)
    pub async fn pair(&self, a: &str, b: &str) -> (String, String, i64) {
        self.register(a, Some(&format!("{a}@example.com"))).await;
        self.register(b, Some(&format!("{b}@example.com"))).await;
        let a_token = self.token(a).await;
        let b_token = self.token(b).await;

        let conversation: Value = self
            .client
            .post(self.url("/new-conversation"))
            .query(&[("recipient_username", b)])
            .bearer_auth(&a_token)
            .send()
            .await
            .expect("new conversation")
            .json()
            .await
            .expect("conversation json");
        let conversation_id = conversation["conversation_id"]
            .as_i64()
            .expect("conversation_id");
        (a_token, b_token, conversation_id)
    }

    /// 等待后台邮件任务完成
    pub async fn wait_for_mail(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..50 {
            {
                let sent = self.mailer.sent.lock().unwrap();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {count} emails");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let mailer = Arc::new(RecordingMailer::default());
    let images = Arc::new(MemoryImageStore::default());
    let hasher = Arc::new(BcryptPasswordHasher::new(Some(4)));
    let clock = Arc::new(SystemClock);

    let settings = WebSettings {
        outbound_queue_capacity: 16,
        max_image_bytes: 1024,
        static_dir: None,
        cors_origins: vec!["*".into()],
    };

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: store.clone(),
        password_hasher: hasher.clone(),
        image_store: images.clone(),
        clock: clock.clone(),
        default_profile_image_url: PLACEHOLDER_IMAGE.into(),
        max_image_bytes: settings.max_image_bytes,
    });
    let conversation_service = ConversationService::new(ConversationServiceDependencies {
        user_repository: store.clone(),
        conversation_repository: store.clone(),
        message_repository: store.clone(),
        default_profile_image_url: PLACEHOLDER_IMAGE.into(),
    });
    let password_reset_service = PasswordResetService::new(PasswordResetServiceDependencies {
        user_repository: store.clone(),
        reset_repository: store.clone(),
        password_hasher: hasher,
        mailer: mailer.clone(),
        clock,
        token_ttl: chrono::Duration::hours(1),
    });
    let ingress = MessageIngress::new(MessageIngressDependencies {
        conversation_repository: store.clone(),
        message_repository: store.clone(),
        broadcaster: registry.clone(),
    });
    let jwt_service = JwtService::new(JwtConfig {
        secret: "integration-test-secret-with-enough-length".into(),
        expiration_hours: 1,
    });

    let state = AppState {
        user_service: Arc::new(user_service),
        conversation_service: Arc::new(conversation_service),
        password_reset_service: Arc::new(password_reset_service),
        ingress: Arc::new(ingress),
        registry: registry.clone(),
        jwt_service: Arc::new(jwt_service),
        settings,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestApp {
        addr,
        client: Client::new(),
        store,
        registry,
        mailer,
        images,
        shutdown: Some(shutdown_tx),
    }
}
