//! Group chat WebSocket handler.
//!
//! Membership is checked before the upgrade. Both directions speak
//! envelopes: inbound frames must decode to `message` envelopes and feed the
//! chat pipeline; anything else earns an `error` envelope on this connection
//! without closing the socket.

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::CurrentUser;
use crate::chat::ChatError;
use crate::protocol::Envelope;

const CODE_UNSUPPORTED_ENVELOPE: &str = "UNSUPPORTED_ENVELOPE";
const CODE_SUBMIT_REJECTED: &str = "SUBMIT_REJECTED";

pub async fn group_ws(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if !state.chat.is_member(group_id, user.id()).await? {
        return Err(ApiError::forbidden("not a member of this group"));
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, group_id, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, group_id: i64, user: CurrentUser) {
    let user_id = user.id().to_string();
    let (conn_id, mut rx) = state.hub.register_group_connection(group_id, &user_id);

    let (mut sink, mut source) = socket.split();

    // hub queue -> socket
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if sink.send(Message::Text(envelope.encode().into())).await.is_err() {
                break;
            }
        }
    });

    // socket -> chat pipeline
    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("socket error for conn {conn_id} in group {group_id}: {e}");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                let reply = handle_inbound(&state, group_id, conn_id, &user_id, text.as_str()).await;
                if let Some(envelope) = reply {
                    state.hub.send_to_connection(group_id, conn_id, &envelope);
                }
            }
            Message::Close(_) => break,
            // axum answers pings itself
            _ => {}
        }
    }

    send_task.abort();
    state.hub.unregister_group_connection(group_id, conn_id);
}

/// Decode and route one inbound frame. Returns the error envelope to send
/// back on this connection, if any; successful submits reply through the
/// group broadcast instead.
async fn handle_inbound(
    state: &AppState,
    group_id: i64,
    conn_id: u64,
    user_id: &str,
    raw: &str,
) -> Option<Envelope> {
    let envelope = match Envelope::decode(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("rejecting frame on conn {conn_id}: {e}");
            return Some(Envelope::from(e));
        }
    };

    let Envelope::Message(data) = envelope else {
        return Some(Envelope::error(
            "group sockets accept message envelopes only",
            Some(CODE_UNSUPPORTED_ENVELOPE),
        ));
    };

    let kind = data.kind.as_deref().unwrap_or("text");
    match state.chat.submit(group_id, user_id, &data.content, kind).await {
        Ok(_) => None,
        Err(ChatError::Internal(e)) => {
            warn!("submit failed for conn {conn_id} in group {group_id}: {e}");
            Some(Envelope::error("message could not be delivered", Some(CODE_SUBMIT_REJECTED)))
        }
        Err(e) => Some(Envelope::error(e.to_string(), Some(CODE_SUBMIT_REJECTED))),
    }
}
