// ============================================================================
// Connection - one live WebSocket session bound to one user
// ============================================================================
//
// Two loops per connection:
// - read loop: transport -> decode -> Hub::route_private_message
// - write loop: mailbox -> transport, in mailbox order
//
// Whichever loop ends first cancels the connection token so the other one
// stops too. The loops are generic over the transport halves so they can run
// against in-memory channels.
// ============================================================================

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use chat_types::{PrivateMessageRequest, UserId};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConnectionControl, ConnectionId, Hub};
use crate::utils::loggable_user;

/// How long the write loop may take to flush and send its close frame once
/// the read side is done
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on sending the close frame, so a stalled peer cannot hold the
/// transport open
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, both loops running
    Open,
    /// Mailbox closed (eviction, replacement, shutdown) or transport failed;
    /// loops are winding down
    Closing,
    /// Both loops exited and the transport is released
    Closed,
}

/// A registered session. Created by [`Connection::open`], driven to
/// completion by [`Connection::run`].
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    hub: Hub,
    mailbox: mpsc::Receiver<String>,
    control: ConnectionControl,
}

impl Connection {
    /// Create a mailbox and register it with the hub for `user_id`. The
    /// connection stops when `shutdown` is cancelled.
    pub async fn open(hub: &Hub, user_id: UserId, shutdown: &CancellationToken) -> Self {
        let (tx, rx) = hub.mailbox();
        let control = ConnectionControl::new(shutdown.child_token());
        let id = hub.register_connection(user_id, tx, control.clone()).await;

        Self {
            id,
            user_id,
            hub: hub.clone(),
            mailbox: rx,
            control,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        self.control.state()
    }

    /// Observe state transitions (Open -> Closing -> Closed)
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.control.subscribe()
    }

    /// Run both loops until the peer disconnects, the transport fails, the
    /// hub drops the connection, or shutdown is cancelled. Unregisters on exit.
    pub async fn run<Si, St, E>(self, sink: Si, stream: St)
    where
        Si: Sink<WsMessage> + Unpin + Send + 'static,
        Si::Error: Display,
        St: Stream<Item = Result<WsMessage, E>> + Unpin,
        E: Display,
    {
        let Connection {
            id,
            user_id,
            hub,
            mailbox,
            control,
        } = self;

        let cancel = control.token().clone();
        let mut writer = tokio::spawn(write_loop(sink, mailbox, cancel.clone()));
        let reader = read_loop(stream, &hub, user_id, cancel.clone());
        tokio::pin!(reader);

        let writer_done = tokio::select! {
            _ = &mut reader => false,
            _ = &mut writer => true,
        };

        control.close();
        hub.unregister(user_id, id).await;

        if writer_done {
            reader.await;
        } else if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            warn!(connection_id = %id, "Write loop did not finish, aborting");
            writer.abort();
        }

        control.set_state(ConnectionState::Closed);
        info!(
            user = %loggable_user(&user_id, hub.logging()),
            connection_id = %id,
            "Connection closed"
        );
    }
}

/// Read frames from the transport and route every well-formed private message.
///
/// Malformed frames are logged and skipped. Returns on peer close, transport
/// error or cancellation.
pub async fn read_loop<St, E>(
    mut stream: St,
    hub: &Hub,
    user_id: UserId,
    cancel: CancellationToken,
) where
    St: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };

        let bytes = match frame {
            Some(Ok(WsMessage::Text(text))) => text.as_str().as_bytes().to_vec(),
            Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
            Some(Ok(WsMessage::Close(_))) | None => break,
            // Ping/pong are answered by the transport
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        };

        let request = match PrivateMessageRequest::decode(&bytes) {
            Ok(request) => request,
            Err(e) => {
                chat_metrics::MALFORMED_FRAMES_TOTAL.inc();
                warn!(error = %e, len = bytes.len(), "Malformed frame ignored");
                continue;
            }
        };

        if let Err(e) = hub
            .route_private_message(user_id, request.receiver_id, request.content)
            .await
        {
            warn!(error = %e, "Failed to route private message");
        }
    }
}

/// Drain the mailbox into the transport in order.
///
/// Ends when the mailbox closes or `cancel` is raised: a close frame is sent
/// (bounded by a short timeout) and the loop returns. A write error, or
/// cancellation while a write is stuck, drops the sink and cancels `cancel`
/// so the read side stops as well.
pub async fn write_loop<Si>(
    mut sink: Si,
    mut mailbox: mpsc::Receiver<String>,
    cancel: CancellationToken,
) where
    Si: Sink<WsMessage> + Unpin,
    Si::Error: Display,
{
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            payload = mailbox.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Write cancelled while the peer was not reading");
                return;
            }
            sent = sink.send(WsMessage::Text(payload.into())) => sent,
        };
        if let Err(e) = sent {
            debug!(error = %e, "WebSocket write error");
            cancel.cancel();
            return;
        }
    }

    let closing = async {
        if let Err(e) = sink.send(WsMessage::Close(None)).await {
            debug!(error = %e, "Failed to send close frame");
        }
        let _ = sink.close().await;
    };
    if tokio::time::timeout(CLOSE_FRAME_TIMEOUT, closing).await.is_err() {
        debug!("Timed out sending close frame");
    }
    cancel.cancel();
}
