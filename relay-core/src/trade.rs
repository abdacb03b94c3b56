//! Trade data structures shared by every relay component

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of an executed fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::str::FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "b" => Ok(TradeSide::Buy),
            "sell" | "s" => Ok(TradeSide::Sell),
            _ => Err(format!("Unknown trade side: {}", s)),
        }
    }
}

/// Which provider in the fallback chain produced a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeSource {
    /// Fetched directly from the running trading agent
    AgentLive,
    /// Served from the cache layer while the agent was unreachable
    Cache,
    /// Served from the upstream market API (last resort)
    FallbackApi,
}

impl TradeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSource::AgentLive => "agent-live",
            TradeSource::Cache => "cache",
            TradeSource::FallbackApi => "fallback-api",
        }
    }
}

impl fmt::Display for TradeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single executed trade.
///
/// Identity is `trade_id`: two values with the same id describe the same
/// execution even if a later fetch reports slightly different fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution time in seconds since the Unix epoch
    pub timestamp: f64,
    /// Market symbol
    pub ticker: String,
    pub side: TradeSide,
    /// Number of contracts, always positive
    pub quantity: u32,
    /// Fill price in the market's native units
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Opaque unique identifier
    pub trade_id: String,
    pub source: TradeSource,
}

impl Trade {
    /// Return the same trade attributed to another provider
    pub fn with_source(mut self, source: TradeSource) -> Self {
        self.source = source;
        self
    }
}

/// Current wall-clock time as float seconds since the epoch
pub fn epoch_seconds() -> f64 {
    to_epoch_seconds(Utc::now())
}

/// Convert a UTC timestamp into float seconds since the epoch
pub fn to_epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Trade {
        Trade {
            timestamp: 1_700_000_000.5,
            ticker: "KXBTC-25DEC31".to_string(),
            side: TradeSide::Buy,
            quantity: 10,
            price: dec!(0.55),
            trade_id: "t-1".to_string(),
            source: TradeSource::AgentLive,
        }
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["side"], "BUY");
        assert_eq!(value["source"], "agent-live");
        assert_eq!(value["price"], serde_json::json!(0.55));
        assert_eq!(value["quantity"], 10);
        assert_eq!(value["trade_id"], "t-1");
    }

    #[test]
    fn test_source_names() {
        assert_eq!(
            serde_json::to_value(TradeSource::FallbackApi).unwrap(),
            "fallback-api"
        );
        assert_eq!(TradeSource::Cache.to_string(), "cache");
    }

    #[test]
    fn test_with_source_keeps_identity() {
        let cached = sample().with_source(TradeSource::Cache);
        assert_eq!(cached.trade_id, "t-1");
        assert_eq!(cached.source, TradeSource::Cache);
    }

    #[test]
    fn test_side_from_str() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("sell".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("hold".parse::<TradeSide>().is_err());
    }

    #[test]
    fn test_epoch_seconds_precision() {
        let time = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        assert_eq!(to_epoch_seconds(time), 1_700_000_000.25);
    }
}
