//! WebSocket connection handlers.
//!
//! Each socket gets an unbounded outbound queue drained by its own task
//! (`pusher_loop`). The receive loop handles one frame at a time; waiting for
//! the next frame is the only point where it can be interrupted.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    domain::{
        ClientId, ConnectionId, Dialect, EndReason, ErrorCode, Notification, PusherChannel,
        SearchCriteria,
    },
    infrastructure::dto::websocket::{InboundMessage, OutboundMessage, SearchPayload},
    ui::state::AppState,
    usecase::{RelayError, SearchError, SearchRequest, SignalKind},
};

/// How long queued frames may take to flush after the receive side ended.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Bind the connection to this client id right away
    pub client_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Convert String -> ClientId (Domain Model)
    let client_id = match query.client_id.map(ClientId::try_from).transpose() {
        Ok(client_id) => client_id,
        Err(e) => {
            tracing::warn!("Rejected connection with invalid client_id: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, client_id)))
}

/// Per-socket state owned by the receive loop.
struct ConnectionContext {
    connection_id: ConnectionId,
    client_id: Option<ClientId>,
    /// Strong handle to the outbound queue, kept only while no client id is
    /// bound. Once bound, the pusher holds the only strong handle, so dropping
    /// it there (replacement, `disconnect`) closes the socket.
    unbound_sender: Option<PusherChannel>,
    sender: mpsc::WeakUnboundedSender<String>,
}

impl ConnectionContext {
    fn new(sender: PusherChannel) -> Self {
        Self {
            connection_id: ConnectionId::generate(),
            client_id: None,
            sender: sender.downgrade(),
            unbound_sender: Some(sender),
        }
    }

    fn outbound(&self) -> Option<PusherChannel> {
        self.unbound_sender
            .clone()
            .or_else(|| self.sender.upgrade())
    }

    /// Send a notification straight to this socket.
    fn reply(&self, notification: &Notification) {
        let Some(sender) = self.outbound() else {
            return;
        };
        match OutboundMessage::from(notification).to_json() {
            Ok(json) => {
                let _ = sender.send(json);
            }
            Err(e) => tracing::error!("Failed to encode reply: {}", e),
        }
    }

    fn reply_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.reply(&Notification::error(code, message));
    }

    async fn register(&mut self, state: &AppState, requested: Option<String>, dialect: Dialect) {
        let Some(sender) = self.outbound() else {
            return;
        };

        let client_id = match state
            .register_client_usecase
            .execute(requested, self.connection_id, dialect, sender)
            .await
        {
            Ok(client_id) => client_id,
            Err(e) => {
                tracing::warn!("Registration rejected: {}", e);
                self.reply_error(ErrorCode::InvalidClientId, e.to_string());
                return;
            }
        };
        tracing::info!("Client '{}' registered ({:?})", client_id, dialect);

        // Re-registering under another id releases the previous one.
        if let Some(previous) = self.client_id.replace(client_id.clone())
            && previous != client_id
        {
            state
                .unregister_client_usecase
                .execute(&previous, self.connection_id, EndReason::Disconnect)
                .await;
        }
        self.unbound_sender = None;

        state.broadcast_presence_usecase.execute().await;
    }

    /// The bound client id, if this socket still owns it.
    ///
    /// The usecases check ownership again under the store lock, so a takeover
    /// after this check still cannot act on the new connection's state.
    async fn current_client(&mut self, state: &AppState) -> Option<ClientId> {
        let client_id = self.client_id.clone()?;
        if state
            .register_client_usecase
            .is_current(&client_id, self.connection_id)
            .await
        {
            Some(client_id)
        } else {
            self.client_id = None;
            None
        }
    }
}

/// Spawns a task that drains the outbound queue into the WebSocket sender.
///
/// When every sender of the queue is gone, a Close frame is sent.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: Option<ClientId>) {
    let (sender, receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut connection = ConnectionContext::new(tx);
    tracing::debug!("Socket {} opened", connection.connection_id);

    let mut send_task = pusher_loop(rx, sender);

    if let Some(client_id) = client_id {
        connection
            .register(&state, Some(client_id.into_string()), Dialect::Video)
            .await;
    }

    let outbound_closed = receive_loop(receiver, &state, &mut connection, &mut send_task).await;

    // Cleanup; a no-op if the id was already released or taken over.
    if let Some(client_id) = connection.client_id.take()
        && state
            .unregister_client_usecase
            .execute(&client_id, connection.connection_id, EndReason::SocketClosed)
            .await
            .is_some()
    {
        state.broadcast_presence_usecase.execute().await;
    }
    tracing::debug!("Socket {} closed", connection.connection_id);
    drop(connection);

    if !outbound_closed && tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }
}

/// Handles inbound frames until the client leaves or the outbound side stops.
///
/// Returns `true` if the outbound task finished first.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    state: &AppState,
    connection: &mut ConnectionContext,
    send_task: &mut JoinHandle<()>,
) -> bool {
    loop {
        let next = tokio::select! {
            next = receiver.next() => next,
            _ = &mut *send_task => return true,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::debug!("WebSocket error on {}: {}", connection.connection_id, e);
                return false;
            }
            None => return false,
        };

        match msg {
            Message::Text(text) => {
                if dispatch(state, connection, text.as_str()).await.is_break() {
                    return false;
                }
            }
            Message::Binary(_) => {
                connection.reply_error(ErrorCode::InvalidMessage, "binary frames are not supported");
            }
            Message::Close(_) => {
                tracing::debug!("Socket {} requested close", connection.connection_id);
                return false;
            }
            // Ping/pong is handled automatically by the WebSocket protocol
            _ => {}
        }
    }
}

async fn dispatch(
    state: &AppState,
    connection: &mut ConnectionContext,
    text: &str,
) -> ControlFlow<()> {
    // 1. JSON として解釈
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Malformed JSON on {}: {}", connection.connection_id, e);
            connection.reply_error(ErrorCode::MalformedJson, e.to_string());
            return ControlFlow::Continue(());
        }
    };

    // 2. メッセージ型として解釈
    let message = match serde_json::from_value::<InboundMessage>(value) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Invalid message on {}: {}", connection.connection_id, e);
            connection.reply_error(ErrorCode::InvalidMessage, e.to_string());
            return ControlFlow::Continue(());
        }
    };

    // 3. 登録
    let message = match message {
        InboundMessage::Register(payload) => {
            connection
                .register(state, payload.wallet_address, Dialect::Video)
                .await;
            return ControlFlow::Continue(());
        }
        InboundMessage::ChatRegister(payload) => {
            connection
                .register(state, payload.wallet_address, Dialect::Chat)
                .await;
            return ControlFlow::Continue(());
        }
        other => other,
    };

    // 4. 登録済みのクライアントからのメッセージ
    let Some(client_id) = connection.current_client(state).await else {
        connection.reply_error(ErrorCode::NotRegistered, "register before sending messages");
        return ControlFlow::Continue(());
    };

    let connection_id = connection.connection_id;
    let signal = match message {
        InboundMessage::Search(payload) => {
            let request = search_request(payload);
            match state
                .search_peer_usecase
                .search(&client_id, connection_id, request)
                .await
            {
                Ok(_) => {}
                Err(SearchError::NotRegistered(_)) => {
                    connection.reply_error(ErrorCode::NotRegistered, "register before searching");
                }
            }
            return ControlFlow::Continue(());
        }
        InboundMessage::StopSearch {} => {
            state
                .search_peer_usecase
                .stop_search(&client_id, connection_id)
                .await;
            return ControlFlow::Continue(());
        }
        InboundMessage::Next {} => {
            if let Err(SearchError::NotRegistered(_)) = state
                .search_peer_usecase
                .next(&client_id, connection_id)
                .await
            {
                connection.reply_error(ErrorCode::NotRegistered, "register before searching");
            }
            return ControlFlow::Continue(());
        }
        InboundMessage::EndCall {} => {
            state
                .search_peer_usecase
                .stop_search(&client_id, connection_id)
                .await;
            state
                .session_lifecycle_usecase
                .end_session(&client_id, connection_id, EndReason::EndCall)
                .await;
            return ControlFlow::Continue(());
        }
        InboundMessage::Disconnect {} => {
            connection.client_id = None;
            if state
                .unregister_client_usecase
                .execute(&client_id, connection_id, EndReason::Disconnect)
                .await
                .is_some()
            {
                state.broadcast_presence_usecase.execute().await;
            }
            return ControlFlow::Break(());
        }
        InboundMessage::Offer { .. } => SignalKind::Offer,
        InboundMessage::Answer { .. } => SignalKind::Answer,
        InboundMessage::IceCandidate { .. } => SignalKind::IceCandidate,
        InboundMessage::Message { .. } => SignalKind::Chat,
        InboundMessage::VideoCallStart { .. }
        | InboundMessage::VideoCallAccept { .. }
        | InboundMessage::VideoCallDecline {} => SignalKind::CallIntent,
        InboundMessage::Register(_) | InboundMessage::ChatRegister(_) => {
            return ControlFlow::Continue(());
        }
    };

    // 5. シグナリングの中継（受け取ったフレームをそのまま）
    match state
        .relay_signal_usecase
        .execute(&client_id, connection_id, signal, text)
        .await
    {
        Ok(_) => {}
        Err(RelayError::NoActiveSession(_)) => {
            tracing::debug!("Dropped {:?} from '{}': no active session", signal, client_id);
        }
        Err(e) => tracing::warn!("Failed to relay {:?}: {}", signal, e),
    }
    ControlFlow::Continue(())
}

fn search_request(payload: SearchPayload) -> SearchRequest {
    let wants_advanced = payload.wants_advanced();
    let balance = payload.tas_balance();
    SearchRequest {
        criteria: SearchCriteria::from(payload),
        wants_advanced,
        balance,
    }
}
