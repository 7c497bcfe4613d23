/*
[INPUT]:  Normalized market data produced by the dispatcher
[OUTPUT]: Exchange-agnostic canonical structs (bar, ticker, trade, order book)
[POS]:    Data layer - contracts every consumer is written against
[UPDATE]: When adding canonical fields or new event kinds
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{KlineInterval, Side};

/// Exchange tag stamped on every canonical entity.
pub const EXCHANGE: &str = "binance";

/// OHLCV candle. Values are reported as received, never clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Candle open time, ms since epoch
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    pub symbol: String,
    pub exchange: String,
    pub interval: KlineInterval,
}

/// Best bid/ask snapshot.
///
/// `timestamp` is local receipt time: the book ticker feed carries no exchange time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub timestamp: i64,
    pub symbol: String,
    pub exchange: String,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub bid_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub bid_size: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub ask_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub ask_size: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub last_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub last_size: Option<Decimal>,
}

impl Ticker {
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}

/// Public trade print. `side` is the taker side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: i64,
    pub symbol: String,
    pub exchange: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    pub side: Side,
    pub trade_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
}

/// Full depth snapshot. Bids descend and asks ascend in exchange order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub timestamp: i64,
    pub symbol: String,
    pub exchange: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub last_update_id: u64,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }
}

/// One normalized event, tagged by stream kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Bar(Bar),
    Ticker(Ticker),
    Trade(Trade),
    OrderBook(OrderBook),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Bar(bar) => &bar.symbol,
            MarketEvent::Ticker(ticker) => &ticker.symbol,
            MarketEvent::Trade(trade) => &trade.symbol,
            MarketEvent::OrderBook(book) => &book.symbol,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            MarketEvent::Bar(bar) => bar.timestamp,
            MarketEvent::Ticker(ticker) => ticker.timestamp,
            MarketEvent::Trade(trade) => trade.timestamp,
            MarketEvent::OrderBook(book) => book.timestamp,
        }
    }
}
