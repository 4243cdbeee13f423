//! WebSocket upgrade handler and per-connection session loop

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::verify_jwt;
use crate::rooms::RoomError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, MatchMode, PlayerBrief, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            info!(user_id = claims.sub, "WebSocket upgrade for authenticated user");
            let user = PlayerBrief {
                user_id: claims.sub,
                display_name: claims.display_name(),
            };
            ws.on_upgrade(move |socket| handle_socket(socket, user, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap_or_default()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user: PlayerBrief, state: AppState) {
    let user_id = user.user_id;
    info!(user_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Reconnecting rebinds the transport handle; any prior socket's writer
    // sees its channel close and winds down. The sender doubles as this
    // socket's cleanup token.
    let (outbound_tx, outbound_rx) = state.fanout.register(user_id);

    let welcome = ServerMsg::Welcome {
        user_id,
        display_name: user.display_name.clone(),
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id, error = %e, "Failed to send welcome");
        state.fanout.unregister(user_id, &outbound_tx);
        return;
    }

    // Writer task: fanout channel -> WebSocket
    let writer_handle = tokio::spawn(writer_loop(user_id, ws_sink, outbound_rx));

    // Reader loop: WebSocket -> services
    let rate_limiter = ConnectionRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => dispatch(&state, &user, msg).await,
                    Err(e) => {
                        warn!(user_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect drops the transport handle and lobby presence. A running
    // match keeps its slot so the player can reconnect into it. When a
    // reconnect already replaced this socket's handle, the user is still
    // online and keeps their room and queue position.
    if state.fanout.unregister(user_id, &outbound_tx) {
        state.rooms.handle_disconnect(user_id).await;
    }
    writer_handle.abort();

    info!(user_id, "WebSocket connection closed");
}

async fn writer_loop(
    user_id: i64,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(user_id, error = %e, "WebSocket send failed");
            break;
        }
    }
    debug!(user_id, "Outbound channel closed");
}

/// Route one parsed client message. Room errors go back on the fanout as
/// wire errors; match input is fire-and-forget.
async fn dispatch(state: &AppState, user: &PlayerBrief, msg: ClientMsg) {
    let user_id = user.user_id;
    match msg {
        ClientMsg::PaddleMove { player, direction } => {
            state.registry.route_input(user_id, player, direction);
        }
        ClientMsg::StartLocal => {
            if state.registry.match_of(user_id).is_some() {
                send_error(state, user_id, "already_in_match", "Already in a match");
                return;
            }
            // Snapshots carry the match id from the first tick
            state.registry.create_match(
                Uuid::new_v4(),
                MatchMode::Local,
                None,
                std::slice::from_ref(user),
            );
        }
        ClientMsg::SubmitResult {
            match_id,
            score1,
            score2,
        } => {
            if let Err(e) = state
                .tournaments
                .recover_result(user_id, match_id, score1, score2)
                .await
            {
                warn!(user_id, match_id = %match_id, error = %e, "Result submission rejected");
                send_error(state, user_id, "submit_rejected", &e.to_string());
            }
        }
        ClientMsg::CreateRoom { max_players } => {
            if let Err(e) = state.rooms.create_room(user.clone(), max_players).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::GetRoom => {
            if let Err(e) = state.rooms.send_current_room(user_id).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::InviteToRoom { user_id: invitee } => {
            if let Err(e) = state.rooms.invite(user_id, invitee).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::RespondInvite { room_id, accept } => {
            if let Err(e) = state.rooms.respond_invite(user.clone(), room_id, accept).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::JoinRoomByCode { code } => {
            if let Err(e) = state.rooms.join_by_code(user.clone(), &code).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::LeaveRoom => {
            if let Err(e) = state.rooms.leave_room(user_id).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::StartRoom => {
            if let Err(e) = state.rooms.start_room(user_id).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::JoinQueue { queue } => {
            if let Err(e) = state.rooms.join_queue(user.clone(), queue).await {
                send_room_error(state, user_id, e);
            }
        }
        ClientMsg::LeaveQueue => {
            state.rooms.leave_queue(user_id).await;
        }
        ClientMsg::Ping { t } => {
            state.fanout.send_to(user_id, ServerMsg::Pong { t });
        }
    }
}

fn send_room_error(state: &AppState, user_id: i64, err: RoomError) {
    debug!(user_id, error = %err, "Room command rejected");
    state.fanout.send_to(
        user_id,
        ServerMsg::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    );
}

fn send_error(state: &AppState, user_id: i64, code: &str, message: &str) {
    state.fanout.send_to(
        user_id,
        ServerMsg::Error {
            code: code.to_string(),
            message: message.to_string(),
        },
    );
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
