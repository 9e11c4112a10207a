//! WebSocket event dispatcher and per-connection state machine.
//!
//! Each connection moves `Connected → Registered → Disconnected`. The
//! dispatcher parses inbound frames into the closed [`InboundEvent`] union,
//! validates payloads, and delegates to the Session Registry, the friend
//! graph store, the signaling relay, or the audio pipeline. Handlers on
//! distinct connections run concurrently; everything a handler emits goes
//! through bounded per-session queues, so one slow client cannot back up
//! another.

use crate::registry::SessionRegistry;
use crate::signaling;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use base64::Engine;
use crosstalk_types::{FriendInfo, InboundEvent, OutboundEvent};
use crosstalk_voice::{PipelineOutcome, TranslationJob};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Bounded per-session outbound queue. 256 events is ample for normal
/// operation; beyond that the client is too slow and events are dropped.
const SESSION_QUEUE_DEPTH: usize = 256;

/// Serializes and queues an event on a session's outbound channel.
pub(crate) fn send_to_session(tx: &mpsc::Sender<String>, event: &OutboundEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("dropping outbound event for slow consumer: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize outbound event: {}", e);
        }
    }
}

fn send_error(tx: &mpsc::Sender<String>, message: impl Into<String>) {
    send_to_session(
        tx,
        &OutboundEvent::Error {
            message: message.into(),
        },
    );
}

/// WebSocket handler: `GET /ws`.
///
/// The upgrade itself is unauthenticated; the connection stays in the
/// `Connected` state until a `register_user` event binds it to an identity.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(remote_addr = %addr, "websocket transport open");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The binding established by `register_user` on this connection.
struct Registration {
    username: String,
    session_id: Uuid,
}

/// Drives one connection from `Connected` to `Disconnected`.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded channel per session; a forwarding task drains it into the
    // socket so handlers never block on a slow client.
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_QUEUE_DEPTH);
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut registration: Option<Registration> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => {
                let event = match serde_json::from_str::<InboundEvent>(&text.to_string()) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("failed to parse incoming WebSocket message: {}", e);
                        send_error(&tx, "invalid message format");
                        continue;
                    }
                };
                dispatch_event(&state, &tx, &mut registration, event).await;
            }
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    // Transport closed: tear down whatever this connection registered.
    if let Some(registration) = registration.take() {
        disconnect(&state, registration).await;
    }
    send_task.abort();
}

/// Routes one validated inbound event to its component.
async fn dispatch_event(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<String>,
    registration: &mut Option<Registration>,
    event: InboundEvent,
) {
    match event {
        InboundEvent::RegisterUser { username } => {
            if username.trim().is_empty() {
                send_error(tx, "Invalid registration data");
                return;
            }

            // Re-registering under a different name on the same transport
            // tears down the old binding first.
            if let Some(previous) = registration.take() {
                if previous.username != username {
                    disconnect(state, previous).await;
                }
            }

            let session_id = state
                .registry
                .register(username.clone(), tx.clone())
                .await;
            *registration = Some(Registration {
                username: username.clone(),
                session_id,
            });
            tracing::info!(username = %username, session_id = %session_id, "session registered");

            announce_online(state, tx, &username).await;
        }

        InboundEvent::CallUser {
            caller,
            callee,
            offer,
        } => {
            signaling::relay_offer(&state.registry, tx, &caller, &callee, offer).await;
        }

        InboundEvent::CallResponse {
            caller,
            answer,
            accepted,
        } => {
            signaling::relay_answer(&state.registry, &caller, answer, accepted).await;
        }

        InboundEvent::IceCandidate { target, candidate } => {
            signaling::relay_ice_candidate(&state.registry, &target, candidate).await;
        }

        InboundEvent::EndCall { target } => {
            signaling::relay_end_call(&state.registry, &target).await;
        }

        InboundEvent::AudioData {
            audio,
            source_language,
            target_language,
        } => {
            let audio = match base64::engine::general_purpose::STANDARD.decode(audio) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("rejecting audio_data with invalid base64 payload: {}", e);
                    send_error(tx, "Invalid audio payload");
                    return;
                }
            };

            // One spawned task per job: a stalled capability stalls this
            // invocation, not the connection's event loop.
            let pipeline = state.pipeline.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let job = TranslationJob {
                    audio,
                    source_language,
                    target_language,
                };
                match pipeline.run(&job).await {
                    Ok(PipelineOutcome::Complete(result)) => {
                        send_to_session(
                            &tx,
                            &OutboundEvent::TranslationResult {
                                original_text: result.original_text,
                                translated_text: result.translated_text,
                                audio: base64::engine::general_purpose::STANDARD
                                    .encode(result.audio),
                            },
                        );
                    }
                    Ok(PipelineOutcome::NoSpeech) => {
                        send_error(&tx, "No speech detected");
                    }
                    Ok(PipelineOutcome::EmptyTranslation) => {
                        send_error(&tx, "Translation failed");
                    }
                    Err(e) => {
                        // The typed kind stays in the server log; the
                        // client gets generic wording.
                        tracing::error!(stage = %e.stage(), "audio pipeline fault: {}", e);
                        send_error(&tx, "Error processing audio");
                    }
                }
            });
        }

        InboundEvent::TranslatedAudio { target, audio } => {
            let delivered = state
                .registry
                .send_event(&target, &OutboundEvent::TranslatedAudio { audio })
                .await;
            if !delivered {
                tracing::debug!(target = %target, "dropping translated audio for absent target");
            }
        }

        InboundEvent::FriendRequest { from, to } => {
            if from.trim().is_empty() || to.trim().is_empty() {
                send_error(tx, "Invalid friend request data");
                return;
            }
            if !state.registry.is_online(&to).await {
                send_error(tx, "User is not online");
                return;
            }

            let result = {
                let pool = state.pool.clone();
                let (from, to) = (from.clone(), to.clone());
                tokio::task::spawn_blocking(move || {
                    let conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
                    crosstalk_graph::send_request(&conn, &from, &to)
                        .map_err(|e| format!("db error: {}", e))
                })
                .await
            };

            match result {
                Ok(Ok(true)) => {
                    state
                        .registry
                        .send_event(&to, &OutboundEvent::FriendRequestReceived { from })
                        .await;
                    send_to_session(tx, &OutboundEvent::FriendRequestSent { to });
                }
                Ok(Ok(false)) => {
                    send_error(tx, "Friend request failed");
                }
                Ok(Err(e)) => {
                    tracing::error!(from = %from, to = %to, "friend request failed: {}", e);
                    send_error(tx, "Friend request failed");
                }
                Err(e) => {
                    tracing::error!("friend request task failed: {}", e);
                    send_error(tx, "Friend request failed");
                }
            }
        }

        InboundEvent::AcceptFriendRequest { from, to } => {
            if from.trim().is_empty() || to.trim().is_empty() {
                send_error(tx, "Invalid request data");
                return;
            }

            let result = {
                let pool = state.pool.clone();
                let (from, to) = (from.clone(), to.clone());
                tokio::task::spawn_blocking(move || {
                    let mut conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
                    crosstalk_graph::accept_request(&mut conn, &to, &from)
                        .map_err(|e| format!("db error: {}", e))
                })
                .await
            };

            let accepted = match result {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => {
                    tracing::error!(from = %from, to = %to, "accept friend request failed: {}", e);
                    false
                }
                Err(e) => {
                    tracing::error!("accept friend request task failed: {}", e);
                    false
                }
            };
            if !accepted {
                send_error(tx, "Failed to accept friend request");
                return;
            }

            // Both parties get a refreshed friend list and an acceptance
            // notice carrying the other's name. The requester may have gone
            // offline meanwhile; their emissions then drop silently.
            match friends_payload(state, &from).await {
                Ok(friends) => {
                    state
                        .registry
                        .send_event(&from, &OutboundEvent::FriendsList { friends })
                        .await;
                }
                Err(e) => tracing::error!(username = %from, "friends list refresh failed: {}", e),
            }
            match friends_payload(state, &to).await {
                Ok(friends) => {
                    send_to_session(tx, &OutboundEvent::FriendsList { friends });
                }
                Err(e) => tracing::error!(username = %to, "friends list refresh failed: {}", e),
            }

            state
                .registry
                .send_event(
                    &from,
                    &OutboundEvent::FriendRequestAccepted {
                        username: to.clone(),
                    },
                )
                .await;
            send_to_session(tx, &OutboundEvent::FriendRequestAccepted { username: from });
        }

        InboundEvent::RejectFriendRequest { from, to } => {
            if from.trim().is_empty() || to.trim().is_empty() {
                send_error(tx, "Invalid request data");
                return;
            }

            let result = {
                let pool = state.pool.clone();
                let (from, to) = (from.clone(), to.clone());
                tokio::task::spawn_blocking(move || {
                    let conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
                    crosstalk_graph::reject_request(&conn, &to, &from)
                        .map_err(|e| format!("db error: {}", e))
                })
                .await
            };

            match result {
                Ok(Ok(true)) => {
                    state
                        .registry
                        .send_event(&from, &OutboundEvent::FriendRequestRejected { username: to })
                        .await;
                }
                Ok(Ok(false)) => {
                    send_error(tx, "Failed to reject friend request");
                }
                Ok(Err(e)) => {
                    tracing::error!(from = %from, to = %to, "reject friend request failed: {}", e);
                    send_error(tx, "Failed to reject friend request");
                }
                Err(e) => {
                    tracing::error!("reject friend request task failed: {}", e);
                    send_error(tx, "Failed to reject friend request");
                }
            }
        }

        InboundEvent::GetFriendRequests { username } => {
            if username.trim().is_empty() {
                send_error(tx, "Invalid request");
                return;
            }

            let result = {
                let pool = state.pool.clone();
                let username = username.clone();
                tokio::task::spawn_blocking(move || {
                    let conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
                    crosstalk_graph::list_pending_requests(&conn, &username)
                        .map_err(|e| format!("db error: {}", e))
                })
                .await
            };

            match result {
                Ok(Ok(requests)) => {
                    send_to_session(tx, &OutboundEvent::FriendRequestsList { requests });
                }
                Ok(Err(e)) => {
                    tracing::error!(username = %username, "pending request lookup failed: {}", e);
                    send_error(tx, "Failed to load friend requests");
                }
                Err(e) => {
                    tracing::error!(username = %username, "pending request task failed: {}", e);
                    send_error(tx, "Failed to load friend requests");
                }
            }
        }

        InboundEvent::GetFriends { username } => {
            if username.trim().is_empty() {
                send_error(tx, "Invalid request");
                return;
            }

            match friends_payload(state, &username).await {
                Ok(friends) => {
                    send_to_session(tx, &OutboundEvent::FriendsList { friends });
                }
                Err(e) => {
                    tracing::error!(username = %username, "friends list lookup failed: {}", e);
                    send_error(tx, "Failed to load friends list");
                }
            }
        }
    }
}

/// Builds a `friends_list` payload: persisted records merged with live
/// presence from the Session Registry.
async fn friends_payload(
    state: &Arc<AppState>,
    username: &str,
) -> Result<Vec<FriendInfo>, String> {
    let records = {
        let pool = state.pool.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
            crosstalk_graph::list_friends(&conn, &username).map_err(|e| format!("db error: {}", e))
        })
        .await
        .map_err(|e| format!("task join error: {}", e))??
    };

    let mut friends = Vec::with_capacity(records.len());
    for record in records {
        let online_status = state.registry.is_online(&record.username).await;
        friends.push(FriendInfo {
            username: record.username,
            online_status,
            last_seen: record.last_seen,
        });
    }
    Ok(friends)
}

/// Marks the identity online and exchanges presence with its sessioned
/// friends: each of them learns the identity came online, and the identity
/// learns which friends are currently online.
async fn announce_online(state: &Arc<AppState>, tx: &mpsc::Sender<String>, username: &str) {
    let result = {
        let pool = state.pool.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
            crosstalk_identity::update_online_status(&conn, &username, true)
                .map_err(|e| format!("db error: {}", e))?;
            crosstalk_graph::list_friends(&conn, &username).map_err(|e| format!("db error: {}", e))
        })
        .await
    };

    let friends = match result {
        Ok(Ok(friends)) => friends,
        Ok(Err(e)) => {
            tracing::warn!(username = %username, "presence announcement failed: {}", e);
            return;
        }
        Err(e) => {
            tracing::warn!(username = %username, "presence announcement task failed: {}", e);
            return;
        }
    };

    for friend in friends {
        let delivered = state
            .registry
            .send_event(
                &friend.username,
                &OutboundEvent::UserOnline {
                    username: username.to_string(),
                },
            )
            .await;
        if delivered {
            send_to_session(
                tx,
                &OutboundEvent::UserOnline {
                    username: friend.username,
                },
            );
        }
    }
}

/// Tears down a registered session: guarded registry removal, persisted
/// offline status with a fresh last-seen stamp, and an offline broadcast
/// to sessioned friends.
async fn disconnect(state: &Arc<AppState>, registration: Registration) {
    let Registration {
        username,
        session_id,
    } = registration;

    // Only the transport that owns the binding gets to mark the identity
    // offline; a replaced session's teardown must not shadow the live one.
    if !state.registry.remove(&username, session_id).await {
        tracing::debug!(username = %username, "disconnect for already-replaced session");
        return;
    }
    tracing::info!(username = %username, "session removed");

    let result = {
        let pool = state.pool.clone();
        let username = username.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| format!("pool error: {}", e))?;
            crosstalk_identity::update_online_status(&conn, &username, false)
                .map_err(|e| format!("db error: {}", e))?;
            crosstalk_graph::list_friends(&conn, &username).map_err(|e| format!("db error: {}", e))
        })
        .await
    };

    let friends = match result {
        Ok(Ok(friends)) => friends,
        Ok(Err(e)) => {
            tracing::warn!(username = %username, "offline bookkeeping failed: {}", e);
            return;
        }
        Err(e) => {
            tracing::warn!(username = %username, "offline bookkeeping task failed: {}", e);
            return;
        }
    };

    for friend in friends {
        state
            .registry
            .send_event(
                &friend.username,
                &OutboundEvent::UserOffline {
                    username: username.clone(),
                },
            )
            .await;
    }
}
