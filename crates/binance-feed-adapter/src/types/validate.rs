/*
[INPUT]:  Canonical market entities as produced by the normalizer
[OUTPUT]: Lists of invariant violations (never corrected values)
[POS]:    Data layer - optional validation on top of raw exchange data
[UPDATE]: When canonical invariants change
*/

use std::fmt;

use rust_decimal::Decimal;

use super::models::{Bar, MarketEvent, OrderBook, OrderBookLevel, Ticker, Trade};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Negative { field: &'static str },
    LowAboveHigh,
    OpenOutsideRange,
    CloseOutsideRange,
    CrossedQuote,
    BidsNotDescending { index: usize },
    AsksNotAscending { index: usize },
    CrossedBook,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Negative { field } => write!(f, "{field} is negative"),
            Violation::LowAboveHigh => f.write_str("low is above high"),
            Violation::OpenOutsideRange => f.write_str("open outside [low, high]"),
            Violation::CloseOutsideRange => f.write_str("close outside [low, high]"),
            Violation::CrossedQuote => f.write_str("bid above ask"),
            Violation::BidsNotDescending { index } => {
                write!(f, "bid level {index} above previous level")
            }
            Violation::AsksNotAscending { index } => {
                write!(f, "ask level {index} below previous level")
            }
            Violation::CrossedBook => f.write_str("best bid at or above best ask"),
        }
    }
}

pub trait Validate {
    fn violations(&self) -> Vec<Violation>;

    fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }
}

fn check_non_negative(out: &mut Vec<Violation>, field: &'static str, value: Decimal) {
    if value.is_sign_negative() && !value.is_zero() {
        out.push(Violation::Negative { field });
    }
}

fn check_optional(out: &mut Vec<Violation>, field: &'static str, value: Option<Decimal>) {
    if let Some(value) = value {
        check_non_negative(out, field, value);
    }
}

impl Validate for Bar {
    fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        check_non_negative(&mut out, "open", self.open);
        check_non_negative(&mut out, "high", self.high);
        check_non_negative(&mut out, "low", self.low);
        check_non_negative(&mut out, "close", self.close);
        check_non_negative(&mut out, "volume", self.volume);

        if self.low > self.high {
            out.push(Violation::LowAboveHigh);
        }
        if self.open < self.low || self.open > self.high {
            out.push(Violation::OpenOutsideRange);
        }
        if self.close < self.low || self.close > self.high {
            out.push(Violation::CloseOutsideRange);
        }
        out
    }
}

impl Validate for Ticker {
    fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        check_optional(&mut out, "bid_price", self.bid_price);
        check_optional(&mut out, "bid_size", self.bid_size);
        check_optional(&mut out, "ask_price", self.ask_price);
        check_optional(&mut out, "ask_size", self.ask_size);
        check_optional(&mut out, "last_price", self.last_price);
        check_optional(&mut out, "last_size", self.last_size);

        if let (Some(bid), Some(ask)) = (self.bid_price, self.ask_price)
            && bid > ask
        {
            out.push(Violation::CrossedQuote);
        }
        out
    }
}

impl Validate for Trade {
    fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        check_non_negative(&mut out, "price", self.price);
        check_non_negative(&mut out, "quantity", self.quantity);
        out
    }
}

fn check_levels(out: &mut Vec<Violation>, levels: &[OrderBookLevel]) {
    for level in levels {
        check_non_negative(out, "level price", level.price);
        check_non_negative(out, "level size", level.size);
    }
}

impl Validate for OrderBook {
    fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        check_levels(&mut out, &self.bids);
        check_levels(&mut out, &self.asks);

        for (index, pair) in self.bids.windows(2).enumerate() {
            if pair[1].price > pair[0].price {
                out.push(Violation::BidsNotDescending { index: index + 1 });
            }
        }
        for (index, pair) in self.asks.windows(2).enumerate() {
            if pair[1].price < pair[0].price {
                out.push(Violation::AsksNotAscending { index: index + 1 });
            }
        }

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask())
            && bid.price >= ask.price
        {
            out.push(Violation::CrossedBook);
        }
        out
    }
}

impl Validate for MarketEvent {
    fn violations(&self) -> Vec<Violation> {
        match self {
            MarketEvent::Bar(bar) => bar.violations(),
            MarketEvent::Ticker(ticker) => ticker.violations(),
            MarketEvent::Trade(trade) => trade.violations(),
            MarketEvent::OrderBook(book) => book.violations(),
        }
    }
}
