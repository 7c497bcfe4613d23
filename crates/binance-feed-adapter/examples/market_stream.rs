/*
[INPUT]:  Public Binance spot streams (no credentials)
[OUTPUT]: Printed candles, trades and best bid/ask for BTCUSDT
[POS]:    Examples - live stream handling
[UPDATE]: When the stream client API changes
*/

use binance_feed_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: subscribe to three streams on one connection and print events
/// for 30 seconds. Pass `testnet` as the first argument to use the testnet host.
#[tokio::main]
async fn main() -> Result<()> {
    let environment = match std::env::args().nth(1).as_deref() {
        Some("testnet") => Environment::Testnet,
        _ => Environment::Production,
    };
    println!("=== Binance Market Stream Example ({environment:?}) ===\n");

    let client = BinanceWebSocket::new(FeedConfig::for_environment(environment));

    let kline = client.subscribe_kline("BTCUSDT", KlineInterval::OneMinute, |bar| {
        println!(
            "[bar]    {} {} o={} h={} l={} c={} v={}",
            bar.symbol, bar.interval, bar.open, bar.high, bar.low, bar.close, bar.volume
        );
    });
    client.subscribe_trade("BTCUSDT", |trade| {
        println!(
            "[trade]  {} {} {} @ {} (#{})",
            trade.symbol,
            trade.side.as_str(),
            trade.quantity,
            trade.price,
            trade.trade_id
        );
    });
    client.subscribe_ticker("BTCUSDT", |ticker| {
        if let Some(mid) = ticker.mid_price() {
            println!("[ticker] {} mid={mid}", ticker.symbol);
        }
    });
    println!("✓ Registered {} streams", client.registry().len());

    client.connect().await?;
    println!("✓ Connected\n");

    sleep(Duration::from_secs(15)).await;

    // Streams can be dropped while connected.
    client.unsubscribe(&kline);
    println!("\n✓ Unsubscribed {kline}\n");

    sleep(Duration::from_secs(15)).await;
    client.close();
    println!("\n✓ Example complete, final state: {:?}", client.state());
    Ok(())
}
