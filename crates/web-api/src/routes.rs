use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use application::{
    dto::{ConversationDto, ConversationPartnerDto, MessageDto, UserDto},
    AuthenticateUserRequest, ProfileImageUpload, RegisterUserRequest, ResetPasswordRequest,
};
use domain::{ConversationId, UserId};

use crate::{
    auth::{bearer_token, CurrentUser, LoginResponse},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

// multipart 边界和字段头的额外开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct CreateUserPayload {
    username: String,
    email: Option<String>,
    password: String,
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct RecipientQuery {
    recipient_username: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageQuery {
    conversation_id: i64,
    message_text: String,
}

#[derive(Debug, Deserialize)]
struct ForgotPasswordQuery {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ResetPasswordPayload {
    reset_token: String,
    new_password: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ProfileImageResponse {
    msg: &'static str,
    profile_image_url: String,
}

#[derive(Debug, Serialize)]
struct ProfileImageUrl {
    profile_image_url: String,
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.settings.max_image_bytes + MULTIPART_OVERHEAD;

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/create-user", post(create_user))
        .route("/token", post(login_for_access_token))
        .route("/users/me", get(read_current_user))
        .route(
            "/users/me/profile-image",
            post(upload_profile_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/users/profile-image", get(get_profile_image))
        .route("/new-conversation", post(new_conversation))
        .route("/send-message", post(send_message))
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversation_messages),
        )
        .route("/conversations/users", get(conversation_partners))
        .route(
            "/conversations/get-conversation-id",
            get(get_conversation_id),
        )
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/ws/conversations/{conversation_id}", get(websocket_upgrade));

    if let Some(dir) = &state.settings.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    let cors = cors_layer(&state.settings.cors_origins);
    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
    .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserDto::from(&user))))
}

async fn login_for_access_token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            username: form.username,
            password: form.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(&user)?;
    Ok(Json(LoginResponse::bearer(token)))
}

async fn read_current_user(CurrentUser(user): CurrentUser) -> Json<UserDto> {
    Json(UserDto::from(&user))
}

async fn upload_profile_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<ProfileImageResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field
            .content_type()
            .map(str::to_owned)
            .unwrap_or_default();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(format!("invalid file field: {err}")))?;
        upload = Some(ProfileImageUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let upload = upload.ok_or_else(|| ApiError::bad_request("missing file field"))?;

    let profile_image_url = state
        .user_service
        .update_profile_image(user.id, upload)
        .await?;

    Ok(Json(ProfileImageResponse {
        msg: "Profile image updated successfully",
        profile_image_url,
    }))
}

async fn get_profile_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<ProfileImageUrl> {
    Json(ProfileImageUrl {
        profile_image_url: state.user_service.profile_image_url(&user),
    })
}

async fn new_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RecipientQuery>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation = state
        .conversation_service
        .start(user.id, &query.recipient_username)
        .await?;

    Ok(Json(ConversationDto::from(&conversation)))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<SendMessageQuery>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .ingress
        .handle_incoming(
            ConversationId::new(query.conversation_id),
            user.id,
            query.message_text,
            None,
        )
        .await?;

    Ok(Json(MessageDto::from(&message)))
}

async fn conversation_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let messages = state
        .conversation_service
        .history(ConversationId::new(conversation_id), user.id)
        .await?;

    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn conversation_partners(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ConversationPartnerDto>>, ApiError> {
    let partners = state.conversation_service.partners(user.id).await?;
    Ok(Json(partners))
}

async fn get_conversation_id(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RecipientQuery>,
) -> Result<Json<ConversationId>, ApiError> {
    let conversation_id = state
        .conversation_service
        .conversation_id_with(user.id, &query.recipient_username)
        .await?;

    Ok(Json(conversation_id))
}

async fn forgot_password(
    State(state): State<AppState>,
    Query(query): Query<ForgotPasswordQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    // 邮件在后台发送，不等待结果
    let _mail = state
        .password_reset_service
        .request_reset(&query.username)
        .await?;

    Ok(Json(MessageResponse {
        message: "OTP sent to your email address.",
    }))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .password_reset_service
        .reset_password(ResetPasswordRequest {
            reset_token: payload.reset_token,
            new_password: payload.new_password,
        })
        .await?;

    Ok(Json(MessageResponse {
        message: "Password successfully reset",
    }))
}

/// 升级前完成身份识别与参与者校验，失败时返回普通 HTTP 错误
async fn websocket_upgrade(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = identify_ws_user(&state, query.token.as_deref(), &headers)?;
    let conversation_id = ConversationId::new(conversation_id);
    state
        .conversation_service
        .authorize(conversation_id, user_id)
        .await?;

    Ok(ws.on_upgrade(move |socket| {
        WebSocketConnection::new(socket, state, conversation_id, user_id).run()
    }))
}

fn identify_ws_user(
    state: &AppState,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<UserId, ApiError> {
    let token = query_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers))
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
    state.jwt_service.identify(token)
}
