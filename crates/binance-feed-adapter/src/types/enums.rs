/*
[INPUT]:  Binance stream vocabulary (kline intervals, depth parameters, trade side)
[OUTPUT]: Closed Rust enums with serialization support
[POS]:    Data layer - enum definitions shared by the market model and stream names
[UPDATE]: When the exchange adds intervals or depth parameters
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Taker side of a trade print from the exchange's "buyer is maker" flag.
    ///
    /// A resting buy order means the aggressor sold.
    pub fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker { Side::Sell } else { Side::Buy }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Candlestick interval. Binance names are case sensitive: `1m` is a minute, `1M` a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl KlineInterval {
    pub const ALL: [KlineInterval; 15] = [
        KlineInterval::OneMinute,
        KlineInterval::ThreeMinutes,
        KlineInterval::FiveMinutes,
        KlineInterval::FifteenMinutes,
        KlineInterval::ThirtyMinutes,
        KlineInterval::OneHour,
        KlineInterval::TwoHours,
        KlineInterval::FourHours,
        KlineInterval::SixHours,
        KlineInterval::EightHours,
        KlineInterval::TwelveHours,
        KlineInterval::OneDay,
        KlineInterval::ThreeDays,
        KlineInterval::OneWeek,
        KlineInterval::OneMonth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KlineInterval::OneMinute => "1m",
            KlineInterval::ThreeMinutes => "3m",
            KlineInterval::FiveMinutes => "5m",
            KlineInterval::FifteenMinutes => "15m",
            KlineInterval::ThirtyMinutes => "30m",
            KlineInterval::OneHour => "1h",
            KlineInterval::TwoHours => "2h",
            KlineInterval::FourHours => "4h",
            KlineInterval::SixHours => "6h",
            KlineInterval::EightHours => "8h",
            KlineInterval::TwelveHours => "12h",
            KlineInterval::OneDay => "1d",
            KlineInterval::ThreeDays => "3d",
            KlineInterval::OneWeek => "1w",
            KlineInterval::OneMonth => "1M",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KlineInterval {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KlineInterval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| FeedError::Config(format!("unknown kline interval: {s}")))
    }
}

/// Number of levels in a partial depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthLevels {
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "20")]
    Twenty,
}

impl DepthLevels {
    pub fn count(self) -> u16 {
        match self {
            DepthLevels::Five => 5,
            DepthLevels::Ten => 10,
            DepthLevels::Twenty => 20,
        }
    }
}

impl TryFrom<u16> for DepthLevels {
    type Error = FeedError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DepthLevels::Five),
            10 => Ok(DepthLevels::Ten),
            20 => Ok(DepthLevels::Twenty),
            other => Err(FeedError::Config(format!(
                "depth levels must be 5, 10 or 20, got {other}"
            ))),
        }
    }
}

/// Push cadence of a partial depth stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateSpeed {
    #[serde(rename = "100ms")]
    Ms100,
    #[serde(rename = "1000ms")]
    Ms1000,
}

impl UpdateSpeed {
    pub fn millis(self) -> u64 {
        match self {
            UpdateSpeed::Ms100 => 100,
            UpdateSpeed::Ms1000 => 1000,
        }
    }
}

impl TryFrom<u64> for UpdateSpeed {
    type Error = FeedError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            100 => Ok(UpdateSpeed::Ms100),
            1000 => Ok(UpdateSpeed::Ms1000),
            other => Err(FeedError::Config(format!(
                "depth update speed must be 100 or 1000 ms, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_names_roundtrip_through_from_str() {
        for interval in KlineInterval::ALL {
            let parsed: KlineInterval = interval.as_str().parse().expect("known interval");
            assert_eq!(parsed, interval);
        }
    }

    #[test]
    fn minute_and_month_are_distinct() {
        assert_eq!("1m".parse::<KlineInterval>().unwrap(), KlineInterval::OneMinute);
        assert_eq!("1M".parse::<KlineInterval>().unwrap(), KlineInterval::OneMonth);
        assert!("2m".parse::<KlineInterval>().is_err());
    }

    #[test]
    fn interval_serializes_as_wire_name() {
        let json = serde_json::to_string(&KlineInterval::OneHour).unwrap();
        assert_eq!(json, "\"1h\"");
    }

    #[test]
    fn depth_parameters_reject_unsupported_values() {
        assert_eq!(DepthLevels::try_from(10).unwrap(), DepthLevels::Ten);
        assert!(DepthLevels::try_from(15).is_err());
        assert_eq!(UpdateSpeed::try_from(100).unwrap(), UpdateSpeed::Ms100);
        assert!(UpdateSpeed::try_from(250).is_err());
    }

    #[test]
    fn taker_side_is_inverse_of_buyer_maker() {
        assert_eq!(Side::from_buyer_maker(true), Side::Sell);
        assert_eq!(Side::from_buyer_maker(false), Side::Buy);
    }
}
