/*
[INPUT]:  Raw combined-stream text frames
[OUTPUT]: Typed envelope and per-kind exchange payloads
[POS]:    WebSocket layer - wire format definitions
[UPDATE]: When the exchange payload shapes change
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Combined-stream envelope. Both fields are optional: control frames carry neither.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Kline event body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KlineData {
    pub k: KlineBody,
}

/// Candle object. The payload's own interval field is deliberately not read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KlineBody {
    pub t: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub o: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub h: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub l: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub c: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub v: Decimal,
}

/// Best bid/ask (`@bookTicker`) body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookTickerData {
    #[serde(rename = "b", with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,
    #[serde(rename = "B", with = "rust_decimal::serde::str")]
    pub bid_qty: Decimal,
    #[serde(rename = "a", with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
    #[serde(rename = "A", with = "rust_decimal::serde::str")]
    pub ask_qty: Decimal,
}

/// Trade print body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeData {
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    #[serde(rename = "t")]
    pub trade_id: u64,
}

/// `[price, size]` pair as sent by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel(
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
);

/// Partial depth snapshot body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepthSnapshotData {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Outbound live subscription control frame
#[derive(Debug, Clone, Serialize)]
pub struct ControlFrame<'a> {
    pub method: ControlMethod,
    pub params: Vec<&'a str>,
    pub id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMethod {
    Subscribe,
    Unsubscribe,
}
