/*
[INPUT]:  Exchange payload (`data` of a combined-stream frame) plus subscription context
[OUTPUT]: One canonical entity per payload
[POS]:    WebSocket layer - wire format to domain model translation
[UPDATE]: When payload shapes or canonical types change
*/

use serde_json::Value;

use super::message::{BookTickerData, DepthLevel, DepthSnapshotData, KlineData, TradeData};
use super::registry::StreamKind;
use crate::error::Result;
use crate::types::{
    Bar, EXCHANGE, KlineInterval, MarketEvent, OrderBook, OrderBookLevel, Side, Ticker, Trade,
};

/// Normalize `data` according to the subscription's kind.
///
/// `received_at` (ms) stamps kinds whose payload carries no exchange time.
pub fn normalize(kind: &StreamKind, symbol: &str, data: Value, received_at: i64) -> Result<MarketEvent> {
    let event = match kind {
        StreamKind::Kline(interval) => MarketEvent::Bar(to_bar(symbol, *interval, data)?),
        StreamKind::Ticker => MarketEvent::Ticker(to_ticker(symbol, data, received_at)?),
        StreamKind::Trade => MarketEvent::Trade(to_trade(symbol, data)?),
        StreamKind::Depth { .. } => MarketEvent::OrderBook(to_order_book(symbol, data, received_at)?),
    };
    Ok(event)
}

/// Candle to [`Bar`]. The interval comes from the subscription, not the payload.
pub fn to_bar(symbol: &str, interval: KlineInterval, data: Value) -> Result<Bar> {
    let KlineData { k } = serde_json::from_value(data)?;
    Ok(Bar {
        timestamp: k.t,
        open: k.o,
        high: k.h,
        low: k.l,
        close: k.c,
        volume: k.v,
        symbol: symbol.to_uppercase(),
        exchange: EXCHANGE.to_string(),
        interval,
    })
}

pub fn to_ticker(symbol: &str, data: Value, received_at: i64) -> Result<Ticker> {
    let quote: BookTickerData = serde_json::from_value(data)?;
    Ok(Ticker {
        timestamp: received_at,
        symbol: symbol.to_uppercase(),
        exchange: EXCHANGE.to_string(),
        bid_price: Some(quote.bid_price),
        bid_size: Some(quote.bid_qty),
        ask_price: Some(quote.ask_price),
        ask_size: Some(quote.ask_qty),
        last_price: None,
        last_size: None,
    })
}

pub fn to_trade(symbol: &str, data: Value) -> Result<Trade> {
    let print: TradeData = serde_json::from_value(data)?;
    Ok(Trade {
        timestamp: print.trade_time,
        symbol: symbol.to_uppercase(),
        exchange: EXCHANGE.to_string(),
        price: print.price,
        quantity: print.quantity,
        side: Side::from_buyer_maker(print.is_buyer_maker),
        trade_id: print.trade_id,
    })
}

/// Snapshot to [`OrderBook`], keeping exchange level order as is.
pub fn to_order_book(symbol: &str, data: Value, received_at: i64) -> Result<OrderBook> {
    let snapshot: DepthSnapshotData = serde_json::from_value(data)?;
    Ok(OrderBook {
        timestamp: received_at,
        symbol: symbol.to_uppercase(),
        exchange: EXCHANGE.to_string(),
        bids: to_levels(snapshot.bids),
        asks: to_levels(snapshot.asks),
        last_update_id: snapshot.last_update_id,
    })
}

fn to_levels(levels: Vec<DepthLevel>) -> Vec<OrderBookLevel> {
    levels
        .into_iter()
        .map(|DepthLevel(price, size)| OrderBookLevel { price, size })
        .collect()
}
