/*
[INPUT]:  WebSocket connection scenarios against an in-process server
[OUTPUT]: Test results for connect, reconnect, give-up, close and live subscriptions
[POS]:    Integration tests - WebSocket client
[UPDATE]: When WebSocket client changes
*/

mod common;

use std::time::Duration;

use binance_feed_adapter::{
    Bar, BinanceWebSocket, ConnectionState, FeedError, KlineInterval, ReconnectPolicy, StreamHealth,
};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use common::{TestServer, WAIT, test_config};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

async fn wait_for_state(client: &BinanceWebSocket, wanted: impl Fn(&ConnectionState) -> bool) -> ConnectionState {
    let mut rx = client.subscribe_connection_state();
    tokio::time::timeout(WAIT, rx.wait_for(|state| wanted(state)))
        .await
        .expect("state reached in time")
        .expect("state channel open")
        .clone()
}

#[test]
fn test_websocket_default() {
    let client = BinanceWebSocket::default();
    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(client.config().live_subscriptions);
}

#[tokio::test]
async fn connect_requests_registered_streams() {
    let mut server = TestServer::start().await;
    let client = BinanceWebSocket::new(test_config(&server.base_url()));
    client.subscribe_trade("BTCUSDT", |_| {});
    client.subscribe_kline("BTCUSDT", KlineInterval::OneMinute, |_| {});

    assert_ok!(client.connect().await);
    let conn = server.next_connection().await;

    assert_eq!(conn.path, "/stream?streams=btcusdt@kline_1m/btcusdt@trade");
    assert_eq!(client.state(), ConnectionState::Connected);
    client.close();
}

#[tokio::test]
async fn frames_reach_callbacks() {
    let mut server = TestServer::start().await;
    let client = BinanceWebSocket::new(test_config(&server.base_url()));
    let (tx, mut rx) = mpsc::unbounded_channel::<Bar>();
    let id = client.subscribe_kline("BTCUSDT", KlineInterval::OneHour, move |bar| {
        let _ = tx.send(bar.clone());
    });

    assert_ok!(client.connect().await);
    let mut conn = server.next_connection().await;
    conn.send_json(json!({"result": null, "id": 1})).await;
    conn.send_json(common::kline_frame(&id)).await;

    let bar = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("bar in time")
        .expect("channel open");
    assert_eq!(bar.symbol, "BTCUSDT");
    assert_eq!(bar.timestamp, 1_700_000_000_000);
    assert!(rx.try_recv().is_err());
    client.close();
}

#[tokio::test]
async fn connect_without_subscriptions_fails() {
    let client = BinanceWebSocket::default();
    assert!(matches!(client.connect().await, Err(FeedError::NoStreams)));
}

#[tokio::test]
async fn first_connect_failure_is_surfaced_and_not_retried() {
    let url = common::closed_port_url().await;
    let client = BinanceWebSocket::new(test_config(&url));
    client.subscribe_trade("BTCUSDT", |_| {});

    let err = client.connect().await.expect_err("nothing listening");
    assert!(err.is_retryable());
    assert_eq!(client.state(), ConnectionState::Failed { attempts: 0 });
}

#[tokio::test]
async fn second_connect_is_rejected_while_connected() {
    let mut server = TestServer::start().await;
    let client = BinanceWebSocket::new(test_config(&server.base_url()));
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let _conn = server.next_connection().await;
    assert!(matches!(client.connect().await, Err(FeedError::AlreadyConnected)));
    client.close();
}

#[tokio::test]
async fn reconnects_with_current_streams_after_server_drop() {
    let mut server = TestServer::start().await;
    let mut config = test_config(&server.base_url());
    config.live_subscriptions = false;
    let client = BinanceWebSocket::new(config);
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let first = server.next_connection().await;
    assert_eq!(first.path, "/stream?streams=btcusdt@trade");

    // Without live subscriptions a new stream waits for the next connection.
    client.subscribe_ticker("ETHUSDT", |_| {});
    drop(first);

    let second = server.next_connection().await;
    assert_eq!(second.path, "/stream?streams=btcusdt@trade/ethusdt@bookTicker");
    wait_for_state(&client, |state| *state == ConnectionState::Connected).await;
    client.close();
}

#[tokio::test]
async fn gives_up_after_reconnect_ceiling_with_doubling_delays() {
    let mut server = TestServer::start_limited(1).await;
    let mut config = test_config(&server.base_url());
    config.reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(20),
        max_attempts: 4,
        jitter: Duration::ZERO,
    };
    let client = BinanceWebSocket::new(config);
    let mut health = client.subscribe_health();
    let mut states = client.subscribe_connection_state();
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let conn = server.next_connection().await;
    drop(conn);

    let mut schedule = Vec::new();
    let final_state = tokio::time::timeout(WAIT, async {
        loop {
            states.changed().await.expect("state channel open");
            let state = states.borrow_and_update().clone();
            match state {
                ConnectionState::Disconnected { attempt, delay } => {
                    if schedule.last() != Some(&(attempt, delay)) {
                        schedule.push((attempt, delay));
                    }
                }
                ConnectionState::Failed { .. } => return state,
                _ => {}
            }
        }
    })
    .await
    .expect("give-up in time");

    assert_eq!(final_state, ConnectionState::Failed { attempts: 4 });
    assert_eq!(
        schedule,
        vec![
            (1, Duration::from_millis(20)),
            (2, Duration::from_millis(40)),
            (3, Duration::from_millis(80)),
            (4, Duration::from_millis(160)),
        ]
    );

    let signal = tokio::time::timeout(WAIT, async {
        loop {
            match health.recv().await {
                Ok(StreamHealth::GaveUp { attempts }) => return attempts,
                Ok(_) => continue,
                Err(err) => panic!("health channel closed: {err}"),
            }
        }
    })
    .await
    .expect("give-up signal in time");
    assert_eq!(signal, 4);
}

#[tokio::test]
async fn empty_registry_waits_for_a_subscription_before_reconnecting() {
    let mut server = TestServer::start().await;
    let client = BinanceWebSocket::new(test_config(&server.base_url()));
    let trade = client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let first = server.next_connection().await;

    client.unsubscribe(&trade);
    drop(first);

    // Longer than the whole backoff budget (10 + 20 + 40 ms).
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        client.state(),
        ConnectionState::Disconnected { attempt: 1, .. }
    ));

    client.subscribe_ticker("ETHUSDT", |_| {});
    let second = server.next_connection().await;
    assert_eq!(second.path, "/stream?streams=ethusdt@bookTicker");
    wait_for_state(&client, |state| *state == ConnectionState::Connected).await;
    client.close();
}

#[tokio::test]
async fn keepalive_pings_are_sent_while_connected() {
    let mut server = TestServer::start().await;
    let mut config = test_config(&server.base_url());
    config.ping_interval = Duration::from_millis(150);
    let client = BinanceWebSocket::new(config);
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let mut conn = server.next_connection().await;

    let pings = tokio::time::timeout(WAIT, async {
        let mut pings = 0;
        while pings < 2 {
            match conn.socket.next().await {
                Some(Ok(Message::Ping(_))) => pings += 1,
                Some(Ok(_)) => continue,
                other => panic!("socket ended before keepalive: {other:?}"),
            }
        }
        pings
    })
    .await
    .expect("keepalive pings in time");
    assert_eq!(pings, 2);
    client.close();
}

#[tokio::test]
async fn close_is_idempotent_and_stops_the_socket() {
    let mut server = TestServer::start().await;
    let client = BinanceWebSocket::new(test_config(&server.base_url()));
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let mut conn = server.next_connection().await;

    client.close();
    client.close();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(conn.next_text().await.is_none());

    // No reconnect follows a close.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn live_subscription_changes_are_sent_as_control_frames() {
    let mut server = TestServer::start().await;
    let client = BinanceWebSocket::new(test_config(&server.base_url()));
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let mut conn = server.next_connection().await;

    let ticker = client.subscribe_ticker("ETHUSDT", |_| {});
    let frame: Value = serde_json::from_str(&conn.next_text().await.expect("subscribe frame")).unwrap();
    assert_eq!(
        frame,
        json!({"method": "SUBSCRIBE", "params": ["ethusdt@bookTicker"], "id": 1})
    );

    client.unsubscribe(&ticker);
    let frame: Value = serde_json::from_str(&conn.next_text().await.expect("unsubscribe frame")).unwrap();
    assert_eq!(
        frame,
        json!({"method": "UNSUBSCRIBE", "params": ["ethusdt@bookTicker"], "id": 2})
    );
    client.close();
}

#[tokio::test]
async fn stale_stream_is_signalled_and_recovers() {
    let mut server = TestServer::start().await;
    let mut config = test_config(&server.base_url());
    config.stale_after = Some(Duration::from_millis(100));
    let client = BinanceWebSocket::new(config);
    let mut health = client.subscribe_health();
    let id = client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let mut conn = server.next_connection().await;

    let signal = tokio::time::timeout(WAIT, health.recv())
        .await
        .expect("stale signal in time")
        .expect("health channel open");
    assert!(matches!(signal, StreamHealth::Stale { .. }));
    assert_eq!(client.state(), ConnectionState::Connected);

    conn.send_json(common::trade_frame(&id, 1, false)).await;
    let signal = tokio::time::timeout(WAIT, health.recv())
        .await
        .expect("recovery signal in time")
        .expect("health channel open");
    assert_eq!(signal, StreamHealth::Recovered);
    client.close();
}

#[tokio::test]
async fn non_data_frames_do_not_keep_the_stream_fresh() {
    let mut server = TestServer::start().await;
    let mut config = test_config(&server.base_url());
    config.stale_after = Some(Duration::from_millis(150));
    let client = BinanceWebSocket::new(config);
    let mut health = client.subscribe_health();
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let mut conn = server.next_connection().await;

    let chatter = async {
        for id in 0..20 {
            conn.send_json(json!({"result": null, "id": id})).await;
            conn.send_json(common::trade_frame("ethusdt@trade", id, false)).await;
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    };
    let signal = tokio::select! {
        signal = health.recv() => signal.expect("health channel open"),
        _ = chatter => panic!("stale signal not raised while only acks arrived"),
    };
    assert!(matches!(signal, StreamHealth::Stale { .. }));
    client.close();
}

#[tokio::test]
async fn stale_stream_reconnects_when_configured() {
    let mut server = TestServer::start().await;
    let mut config = test_config(&server.base_url());
    config.stale_after = Some(Duration::from_millis(100));
    config.reconnect_on_stale = true;
    let client = BinanceWebSocket::new(config);
    let mut health = client.subscribe_health();
    client.subscribe_trade("BTCUSDT", |_| {});

    assert_ok!(client.connect().await);
    let _first = server.next_connection().await;

    let signal = tokio::time::timeout(WAIT, health.recv())
        .await
        .expect("stale signal in time")
        .expect("health channel open");
    assert!(matches!(signal, StreamHealth::Stale { .. }));

    let second = server.next_connection().await;
    assert_eq!(second.path, "/stream?streams=btcusdt@trade");
    client.close();
}
