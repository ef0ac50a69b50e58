#![allow(dead_code)]

use chat_db::{MemoryMessageStore, MessageStore};
use chat_types::{Message, Pagination, UserId};
use futures_util::{SinkExt, StreamExt};
use qasynda_chat::{ChatServer, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, WebSocketStream};

pub type ClientStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryMessageStore>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

/// Start a chat server on an ephemeral port with the in-process queue and
/// an in-memory message store.
pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryMessageStore::new());
    let config = Arc::new(Config::for_tests());
    let server = ChatServer::build(config, store.clone() as Arc<dyn MessageStore>)
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = shutdown_rx.await;
    }));

    TestApp {
        address,
        store,
        shutdown_tx: Some(shutdown_tx),
        handle,
    }
}

impl TestApp {
    pub async fn connect(&self, user_id: UserId) -> ClientStream {
        let url = format!("ws://{}/ws?user_id={}", self.address, user_id);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    /// Poll the store until the pair has at least `count` messages
    pub async fn wait_for_history(&self, a: UserId, b: UserId, count: usize) -> Vec<Message> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let history = self
                    .store
                    .history(&a, &b, Pagination::default())
                    .await
                    .unwrap();
                if history.len() >= count {
                    return history;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("messages were not persisted in time")
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .unwrap()
            .unwrap();
    }
}

pub async fn send_private(ws: &mut ClientStream, receiver: UserId, content: &str) {
    let frame = serde_json::json!({ "receiver_id": receiver, "content": content });
    ws.send(WsMessage::text(frame.to_string())).await.unwrap();
}

/// Next delivered message, skipping control frames
pub async fn recv_message(ws: &mut ClientStream) -> Message {
    let next = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Message::from_slice(text.as_str().as_bytes())
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                other => panic!("expected a text frame, got {:?}", other),
            }
        }
    })
    .await
    .expect("no message received in time");
    next.unwrap()
}
