/*
[INPUT]:  Test scenarios needing a stream endpoint
[OUTPUT]: In-process WebSocket server, frame fixtures and client config helpers
[POS]:    Test infrastructure - shared across integration test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for binance-feed-adapter tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use binance_feed_adapter::{FeedConfig, ReconnectPolicy};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

pub const WAIT: Duration = Duration::from_secs(5);

/// One accepted client connection
pub struct ServerConn {
    /// Request path and query, e.g. `/stream?streams=btcusdt@trade`
    pub path: String,
    pub socket: WebSocketStream<TcpStream>,
}

impl ServerConn {
    pub async fn send_json(&mut self, value: Value) {
        self.socket
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("server send");
    }

    /// Next text frame from the client, skipping control frames.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            let frame = tokio::time::timeout(WAIT, self.socket.next())
                .await
                .expect("client frame in time")?;
            match frame {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConn>,
}

impl TestServer {
    /// Server accepting any number of connections.
    pub async fn start() -> Self {
        Self::spawn(usize::MAX).await
    }

    /// Server that closes its listener after `limit` connections.
    pub async fn start_limited(limit: usize) -> Self {
        Self::spawn(limit).await
    }

    async fn spawn(limit: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut accepted = 0;
            while accepted < limit {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accepted += 1;

                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut path = String::new();
                    let capture = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        path = request.uri().to_string();
                        Ok(response)
                    };
                    if let Ok(socket) = accept_hdr_async(stream, capture).await {
                        let _ = tx.send(ServerConn { path, socket });
                    }
                });
            }
        });

        Self { addr, connections }
    }

    pub fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn next_connection(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("client connected in time")
            .expect("server running")
    }
}

/// Client config pointed at a local server with fast reconnects.
pub fn test_config(base_url: &str) -> FeedConfig {
    let mut config = FeedConfig::with_base_url(base_url);
    config.connect_timeout = Duration::from_secs(2);
    config.ping_interval = Duration::from_secs(60);
    config.reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_attempts: 3,
        jitter: Duration::ZERO,
    };
    config
}

/// Address with nothing listening on it.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}")
}

pub fn kline_frame(stream: &str) -> Value {
    json!({
        "stream": stream,
        "data": {
            "e": "kline",
            "k": {"t": 1700000000000i64, "o": "100.0", "h": "105.0", "l": "99.0", "c": "103.0", "v": "12.5"}
        }
    })
}

pub fn trade_frame(stream: &str, trade_id: u64, is_buyer_maker: bool) -> Value {
    json!({
        "stream": stream,
        "data": {"e": "trade", "T": 1700000000123i64, "p": "42000.10", "q": "0.005", "m": is_buyer_maker, "t": trade_id}
    })
}
