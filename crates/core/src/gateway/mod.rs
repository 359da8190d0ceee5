//! Gateway Connection (C4): per-connection state machine over a WebSocket
//! upgrade. One reader task drives the state machine; writes are
//! serialized through an unbounded `mpsc` channel drained by a dedicated
//! writer task, so frame boundaries are preserved under concurrent
//! server-initiated pushes (heartbeats, C9 deliveries) and client replies.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use im_protocol::{Command, Frame, SignInInput};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::bearer::{self, Identity};
use crate::registry::ConnectionHandle;
use crate::repo::devices;
use crate::state::AppState;

const READ_DEADLINE: Duration = Duration::from_secs(12 * 60);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4 * 60);

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: Option<String>,
}

pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let pre_authenticated = query
        .token
        .as_deref()
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(bearer::extract_bearer)
        })
        .and_then(|token| bearer::verify(&state.config, token).ok());

    ws.on_upgrade(move |socket| run(socket, state, pre_authenticated))
}

/// Connection lifecycle state. `Closed` is terminal; every exit path from
/// `serve` passes through cleanup regardless of which state it was in.
enum ConnState {
    Anonymous,
    Authenticated { identity: Identity },
}

async fn run(socket: WebSocket, state: AppState, pre_authenticated: Option<Identity>) {
    let (mut sink, mut stream) = socket.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = writer_rx.recv().await {
            if tokio::time::timeout(WRITE_DEADLINE, sink.send(message))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut conn_state = match pre_authenticated {
        Some(identity) => {
            if bind_session(&state, identity, &writer_tx).await.is_err() {
                let _ = writer_tx.send(Message::Close(None));
                writer_task.abort();
                return;
            }
            ConnState::Authenticated { identity }
        }
        None => ConnState::Anonymous,
    };

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = tokio::time::timeout(READ_DEADLINE, stream.next()) => {
                let Ok(Some(Ok(message))) = frame else {
                    break;
                };
                let Message::Binary(bytes) = message else {
                    if matches!(message, Message::Close(_)) {
                        break;
                    }
                    continue;
                };
                match dispatch(&state, &conn_state, &bytes, &writer_tx).await {
                    Some(new_state) => conn_state = new_state,
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                let frame = Frame::ok(Command::Heartbeat, 0);
                if let Ok(bytes) = frame.encode() {
                    if writer_tx.send(Message::Binary(bytes)).is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let ConnState::Authenticated { identity } = conn_state {
        close_session(&state, identity);
    }
    drop(writer_tx);
    let _ = writer_task.await;
}

/// Dispatch one inbound frame. Returns `Some(new_state)` to continue the
/// loop (state unchanged unless sign-in just succeeded), or `None` to
/// close the connection.
async fn dispatch(
    state: &AppState,
    conn_state: &ConnState,
    bytes: &[u8],
    writer_tx: &mpsc::UnboundedSender<Message>,
) -> Option<ConnState> {
    let frame = match Frame::decode(bytes) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(error = %err, "dropping undecodable client frame");
            return None;
        }
    };

    match conn_state {
        ConnState::Anonymous => match frame.command {
            Command::SignIn => handle_sign_in(state, &frame, writer_tx).await,
            _ => {
                let reply = Frame::error(frame.request_id, 1, "sign in required");
                send(writer_tx, &reply);
                None
            }
        },
        ConnState::Authenticated { identity } => match frame.command {
            Command::Heartbeat => Some(ConnState::Authenticated {
                identity: *identity,
            }),
            Command::SignIn => Some(ConnState::Authenticated {
                identity: *identity,
            }),
            _ => {
                let reply = Frame::error(frame.request_id, 2, "unsupported command");
                send(writer_tx, &reply);
                Some(ConnState::Authenticated {
                    identity: *identity,
                })
            }
        },
    }
}

async fn handle_sign_in(
    state: &AppState,
    frame: &Frame,
    writer_tx: &mpsc::UnboundedSender<Message>,
) -> Option<ConnState> {
    let input: SignInInput = match frame.parse_data() {
        Ok(input) => input,
        Err(err) => {
            tracing::warn!(error = %err, "malformed sign_in payload");
            send(writer_tx, &Frame::error(frame.request_id, 3, "malformed sign_in payload"));
            return None;
        }
    };

    let identity = match bearer::verify(&state.config, &input.token) {
        Ok(identity) => identity,
        Err(_) => {
            send(writer_tx, &Frame::error(frame.request_id, 4, "invalid token"));
            return None;
        }
    };

    // Trust the verified bearer, not the client-supplied ids: reject a
    // sign-in that claims an identity the token wasn't issued for.
    if identity.user_id != input.user_id as i64 || identity.device_id != input.device_id as i64 {
        send(writer_tx, &Frame::error(frame.request_id, 5, "token does not match claimed identity"));
        return None;
    }

    if bind_session(state, identity, writer_tx).await.is_err() {
        send(writer_tx, &Frame::error(frame.request_id, 6, "sign in failed"));
        return None;
    }

    send(writer_tx, &Frame::ok(Command::SignIn, frame.request_id));
    Some(ConnState::Authenticated { identity })
}

/// Mark the device online and install its handle in the Connection
/// Registry. Shared by both the pre-authenticated upgrade path and the
/// `SIGN_IN` frame path.
async fn bind_session(
    state: &AppState,
    identity: Identity,
    writer_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ()> {
    if let Err(err) = devices::ensure_device(&state.pool, identity.device_id, identity.user_id).await
    {
        tracing::warn!(error = %err, device_id = identity.device_id, "ensure_device failed");
        return Err(());
    }
    if let Err(err) = devices::mark_online(&state.pool, identity.device_id, None).await {
        tracing::warn!(error = %err, device_id = identity.device_id, "mark_online failed");
    }

    let handle = ConnectionHandle::new(identity.user_id, identity.device_id, writer_tx.clone());
    state.registry.set(identity.device_id, handle);
    Ok(())
}

/// Close semantics: remove from the registry, best-effort mark the
/// device offline. Idempotent — safe to call once per connection
/// regardless of which terminal path triggered it.
fn close_session(state: &AppState, identity: Identity) {
    state.registry.delete(identity.device_id);
    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(err) = devices::mark_offline(&pool, identity.device_id).await {
            tracing::warn!(error = %err, device_id = identity.device_id, "mark_offline failed");
        }
    });
}

fn send(writer_tx: &mpsc::UnboundedSender<Message>, frame: &Frame) {
    if let Ok(bytes) = frame.encode() {
        let _ = writer_tx.send(Message::Binary(bytes));
    }
}
