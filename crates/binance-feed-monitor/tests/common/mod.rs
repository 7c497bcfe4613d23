/*
[INPUT]:  Monitor test scenarios needing a stream endpoint
[OUTPUT]: Minimal in-process WebSocket server and YAML fixtures
[POS]:    Test infrastructure - shared across monitor integration tests
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub base_url: String,
    connections: mpsc::UnboundedReceiver<WebSocketStream<TcpStream>>,
}

impl TestServer {
    /// Accepts up to `limit` connections, then stops listening.
    pub async fn start(limit: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for _ in 0..limit {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                if let Ok(socket) = accept_async(stream).await {
                    let _ = tx.send(socket);
                }
            }
        });

        Self {
            base_url: format!("ws://{addr}"),
            connections,
        }
    }

    pub async fn next_connection(&mut self) -> WebSocketStream<TcpStream> {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("client connected in time")
            .expect("server running")
    }
}

pub async fn send_json(socket: &mut WebSocketStream<TcpStream>, value: serde_json::Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("server send");
}

/// Monitor YAML pointed at `base_url` with fast reconnects.
pub fn monitor_yaml(base_url: &str, subscriptions: &str) -> String {
    format!(
        "base_url: {base_url}\nreconnect:\n  base_delay_ms: 10\n  max_attempts: 2\nsummary_interval_secs: 1\nsubscriptions:\n{subscriptions}"
    )
}
