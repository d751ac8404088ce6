//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection owns one `ClientSession`; session and banner changes are pushed
//! to the client as they happen, fetches run as background tasks.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, ClientSession},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use job_board_core::access::{authorize, Access};
use job_board_core::connectivity::{ConnectivityMonitor, OfflineNotice};
use job_board_core::domain::Document;
use job_board_core::ports::AuthError;
use job_board_core::session::SessionSnapshot;
use std::sync::Arc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinSet,
};
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "New WebSocket connection established");

    // The sender is wrapped in an Arc<Mutex<>> so fetch tasks can reply on their own.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let client = ClientSession::new(&app_state);
    let mut session_rx = client.session.subscribe();
    let mut banner_rx = client.banner.subscribe();
    let mut fetches: JoinSet<()> = JoinSet::new();

    // --- 1. Initial State ---
    let snapshot = session_rx.borrow_and_update().clone();
    let banner = *banner_rx.borrow_and_update();
    let initial = [
        ServerMessage::Session {
            principal: snapshot.principal,
            loading: snapshot.loading,
        },
        ServerMessage::Connectivity {
            online: app_state.connectivity.is_online(),
            banner,
        },
    ];
    for msg in &initial {
        if send(&ws_sender, msg).await.is_err() {
            warn!(%connection_id, "Client went away before the initial state was sent");
            return;
        }
    }

    // --- 2. Main Loop ---
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_text_message(
                        text.to_string(),
                        &client,
                        &app_state.connectivity,
                        &ws_sender,
                        &mut fetches,
                    )
                    .await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!(%connection_id, "Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%connection_id, "WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!(%connection_id, "Client disconnected.");
                    break;
                }
            },
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = session_rx.borrow_and_update().clone();
                let msg = ServerMessage::Session {
                    principal: snapshot.principal,
                    loading: snapshot.loading,
                };
                if send(&ws_sender, &msg).await.is_err() {
                    break;
                }
            }
            changed = banner_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let banner = *banner_rx.borrow_and_update();
                let msg = ServerMessage::Connectivity {
                    online: app_state.connectivity.is_online(),
                    banner,
                };
                if send(&ws_sender, &msg).await.is_err() {
                    break;
                }
            }
            Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(%connection_id, "Fetch task panicked: {:?}", e);
                    }
                }
            }
        }
    }

    // --- 3. Cleanup ---
    fetches.abort_all();
    info!(%connection_id, "WebSocket connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: String,
    client: &ClientSession,
    connectivity: &ConnectivityMonitor,
    ws_sender: &WsSender,
    fetches: &mut JoinSet<()>,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            let _ = send(
                ws_sender,
                &ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                },
            )
            .await;
            return;
        }
    };

    match client_msg {
        ClientMessage::SignUp {
            email,
            password,
            role,
        } => {
            let result = client
                .session
                .sign_up_with_email(&email, &password, role)
                .await;
            report_auth_result(ws_sender, result).await;
        }
        ClientMessage::Login { email, password } => {
            let result = client.session.login_with_email(&email, &password).await;
            report_auth_result(ws_sender, result).await;
        }
        ClientMessage::SignInWithGoogle => client.session.sign_in_with_google().await,
        ClientMessage::Logout => client.session.logout().await,
        ClientMessage::SelectRole { role } => {
            let result = client.session.select_role(role).await;
            report_auth_result(ws_sender, result).await;
        }
        ClientMessage::FetchCollection {
            request_id,
            collection,
            conditions,
        } => {
            let facade = client.facade.clone();
            let session = client.session.subscribe();
            let connectivity = connectivity.clone();
            let ws_sender = ws_sender.clone();
            fetches.spawn(async move {
                let msg = match guard(session, &request_id).await {
                    Err(denied) => denied,
                    Ok(()) => {
                        let outcome = facade.fetch_collection(&collection, &conditions).await;
                        let notice =
                            OfflineNotice::select(outcome.error.as_ref(), connectivity.is_online());
                        ServerMessage::Collection {
                            request_id,
                            documents: outcome.data.into_iter().map(Document::into_json).collect(),
                            error: outcome.error,
                            notice,
                        }
                    }
                };
                let _ = send(&ws_sender, &msg).await;
            });
        }
        ClientMessage::FetchDocument {
            request_id,
            collection,
            id,
        } => {
            let facade = client.facade.clone();
            let session = client.session.subscribe();
            let connectivity = connectivity.clone();
            let ws_sender = ws_sender.clone();
            fetches.spawn(async move {
                let msg = match guard(session, &request_id).await {
                    Err(denied) => denied,
                    Ok(()) => {
                        let outcome = facade.fetch_document(&collection, &id).await;
                        let notice =
                            OfflineNotice::select(outcome.error.as_ref(), connectivity.is_online());
                        ServerMessage::Document {
                            request_id,
                            document: outcome.data.map(Document::into_json),
                            error: outcome.error,
                            notice,
                        }
                    }
                };
                let _ = send(&ws_sender, &msg).await;
            });
        }
        ClientMessage::ClearError => client.facade.clear_error(),
    }
}

/// Waits for the session to resolve, then admits any signed-in principal.
async fn guard(
    mut session: watch::Receiver<SessionSnapshot>,
    request_id: &str,
) -> Result<(), ServerMessage> {
    if session.wait_for(|s| !s.loading).await.is_err() {
        warn!("Session closed before request {} was authorized", request_id);
    }
    let snapshot = session.borrow().clone();
    match authorize(&snapshot, None) {
        Access::Granted => Ok(()),
        access => Err(ServerMessage::AccessDenied {
            request_id: request_id.to_string(),
            access,
        }),
    }
}

async fn report_auth_result(ws_sender: &WsSender, result: Result<(), AuthError>) {
    if let Err(e) = result {
        info!("Authentication request rejected: {}", e);
        let msg = ServerMessage::AuthFailed {
            code: e.code().to_string(),
            message: e.to_string(),
        };
        let _ = send(ws_sender, &msg).await;
    }
}

async fn send(ws_sender: &WsSender, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {:?}", e);
            return Ok(());
        }
    };
    ws_sender.lock().await.send(Message::Text(json.into())).await
}
