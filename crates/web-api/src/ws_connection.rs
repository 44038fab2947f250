use application::{Connection, ConnectionSession};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConversationId, UserId};
use futures_util::{SinkExt, StreamExt};

use crate::error::ApiError;
use crate::state::AppState;

/// WebSocket 连接
///
/// 一个连接对应一个任务：加入注册表后在同一个循环里转发广播消息、
/// 把客户端文本帧交给消息入口。任务结束（包括被取消）时会话负责离开注册表。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    conversation_id: ConversationId,
    user_id: UserId,
}

impl WebSocketConnection {
    /// 调用方需已完成身份识别和参与者校验
    pub fn new(
        socket: WebSocket,
        state: AppState,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Self {
        Self {
            socket,
            state,
            conversation_id,
            user_id,
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            conversation_id,
            user_id,
        } = self;

        let (connection, mut outbound) =
            Connection::new(user_id, state.settings.outbound_queue_capacity);
        let mut session =
            ConnectionSession::begin(state.registry.clone(), conversation_id, user_id);
        let connection_id = match session.join(connection) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(%conversation_id, %user_id, error = %err, "加入会话失败");
                session.fail("join rejected");
                return;
            }
        };

        let (mut sender, mut incoming) = socket.split();

        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(payload) => {
                        if let Err(err) = sender.send(WsMessage::Text(payload.into())).await {
                            tracing::debug!(%connection_id, error = %err, "写入 WebSocket 失败");
                            session.fail("socket write failed");
                            break;
                        }
                    }
                    // 发送端被注册表丢弃：队列写满或服务关闭
                    None => {
                        let _ = sender.send(WsMessage::Close(None)).await;
                        session.fail("evicted from registry");
                        break;
                    }
                },
                message = incoming.next() => match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = state
                            .ingress
                            .handle_incoming(
                                conversation_id,
                                user_id,
                                text.as_str(),
                                Some(connection_id),
                            )
                            .await;
                        if let Err(err) = reply {
                            let frame = ApiError::from(err).to_frame();
                            if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                                session.fail("socket write failed");
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        let frame = ApiError::new(
                            axum::http::StatusCode::BAD_REQUEST,
                            "UNSUPPORTED_FRAME",
                            "only text frames are accepted",
                        )
                        .to_frame();
                        if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                            session.fail("socket write failed");
                            break;
                        }
                    }
                    // axum 自动回复 Pong
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => {
                        session.close();
                        break;
                    }
                    Some(Err(err)) => {
                        tracing::debug!(%connection_id, error = %err, "读取 WebSocket 失败");
                        session.fail("socket read failed");
                        break;
                    }
                },
            }
        }
    }
}
