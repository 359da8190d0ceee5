//! `POST /v1/messages`: the `SendMessage` RPC, a thin HTTP binding over
//! the Message Writer (C6).

use axum::Json;
use axum::extract::State;
use im_protocol::MessageContent;
use serde::{Deserialize, Serialize};

use crate::core::writer::SendMessageRequest;
use crate::error::AppResult;
use crate::http::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageHttpRequest {
    pub recipient_id: i64,
    pub content: MessageContent,
    pub client_msg_id: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageHttpResponse {
    pub message_id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub server_time: i64,
    pub client_msg_id: String,
}

pub async fn send_message(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<SendMessageHttpRequest>,
) -> AppResult<Json<SendMessageHttpResponse>> {
    let reply = state
        .writer()
        .send_message(
            identity.user_id,
            identity.device_id,
            SendMessageRequest {
                recipient_id: body.recipient_id,
                content: body.content,
                client_msg_id: body.client_msg_id,
            },
        )
        .await?;

    Ok(Json(SendMessageHttpResponse {
        message_id: reply.message_id,
        conversation_id: reply.conversation_id,
        seq: reply.seq,
        server_time: reply.server_time,
        client_msg_id: reply.client_msg_id,
    }))
}
