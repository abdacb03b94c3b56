//! Kalshi API response types
//!
//! These types mirror the Kalshi API responses and are converted
//! to relay-core types for use in the relay.

use chrono::{DateTime, Utc};
use relay_core::{to_epoch_seconds, RelayError, Trade, TradeSide, TradeSource};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Response from GET /portfolio/fills
#[derive(Debug, Clone, Deserialize)]
pub struct FillsResponse {
    pub fills: Vec<KalshiFill>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A single fill from the authenticated portfolio
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KalshiFill {
    /// Trade ID shared with the public trade tape
    #[serde(default)]
    pub trade_id: Option<String>,

    /// Order that produced this fill
    #[serde(default)]
    pub order_id: Option<String>,

    /// Market ticker
    #[serde(default)]
    pub ticker: Option<String>,

    /// "buy" or "sell"
    #[serde(default)]
    pub action: Option<String>,

    /// Contract side, "yes" or "no"
    #[serde(default)]
    pub side: Option<String>,

    /// Number of contracts filled
    #[serde(default)]
    pub count: Option<i64>,

    /// YES price in cents
    #[serde(default)]
    pub yes_price: Option<i64>,

    /// NO price in cents
    #[serde(default)]
    pub no_price: Option<i64>,

    /// Whether this fill took liquidity
    #[serde(default)]
    pub is_taker: Option<bool>,

    /// When the fill happened
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

impl KalshiFill {
    /// Convert to a relay trade tagged as coming from the fallback API
    pub fn to_trade(&self) -> Result<Trade, RelayError> {
        let trade_id = self
            .trade_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::malformed("Kalshi fill without trade_id"))?;

        let ticker = self
            .ticker
            .clone()
            .ok_or_else(|| RelayError::malformed(format!("Kalshi fill {} without ticker", trade_id)))?;

        let side = match self.action.as_deref() {
            Some(action) => action
                .parse::<TradeSide>()
                .map_err(|e| RelayError::malformed(format!("Kalshi fill {}: {}", trade_id, e)))?,
            None => {
                return Err(RelayError::malformed(format!(
                    "Kalshi fill {} without action",
                    trade_id
                )))
            }
        };

        let quantity = self
            .count
            .filter(|c| *c > 0)
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(|| {
                RelayError::malformed(format!("Kalshi fill {} has invalid count", trade_id))
            })?;

        // Price of the contract side that was actually traded
        let cents = match self.side.as_deref() {
            Some("no") => self.no_price,
            _ => self.yes_price,
        };
        let price = cents
            .map(|p| Decimal::from(p) / Decimal::from(100))
            .ok_or_else(|| RelayError::malformed(format!("Kalshi fill {} without price", trade_id)))?;

        let timestamp = self
            .created_time
            .map(to_epoch_seconds)
            .ok_or_else(|| {
                RelayError::malformed(format!("Kalshi fill {} without created_time", trade_id))
            })?;

        Ok(Trade {
            timestamp,
            ticker,
            side,
            quantity,
            price,
            trade_id,
            source: TradeSource::FallbackApi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILLS_JSON: &str = r#"{
        "fills": [
            {
                "trade_id": "f-2",
                "order_id": "o-1",
                "ticker": "KXFED-25DEC",
                "action": "sell",
                "side": "no",
                "count": 4,
                "yes_price": 61,
                "no_price": 39,
                "is_taker": true,
                "created_time": "2025-01-02T03:04:05Z"
            },
            {
                "trade_id": "f-1",
                "ticker": "KXFED-25DEC",
                "action": "buy",
                "side": "yes",
                "count": 10,
                "yes_price": 55,
                "no_price": 45,
                "created_time": "2025-01-02T03:00:00Z"
            }
        ],
        "cursor": "abc"
    }"#;

    #[test]
    fn test_parse_and_convert_fills() {
        let response: FillsResponse = serde_json::from_str(FILLS_JSON).unwrap();
        assert_eq!(response.cursor.as_deref(), Some("abc"));

        let trades: Vec<Trade> = response
            .fills
            .iter()
            .map(|f| f.to_trade().unwrap())
            .collect();

        assert_eq!(trades[0].trade_id, "f-2");
        assert_eq!(trades[0].side, TradeSide::Sell);
        assert_eq!(trades[0].price, Decimal::new(39, 2));
        assert_eq!(trades[0].quantity, 4);
        assert_eq!(trades[0].source, TradeSource::FallbackApi);

        assert_eq!(trades[1].side, TradeSide::Buy);
        assert_eq!(trades[1].price, Decimal::new(55, 2));
        assert!(trades[0].timestamp > trades[1].timestamp);
    }

    #[test]
    fn test_fill_without_id_is_malformed() {
        let fill: KalshiFill =
            serde_json::from_str(r#"{"ticker": "X", "action": "buy", "count": 1}"#).unwrap();
        assert!(matches!(fill.to_trade(), Err(RelayError::Malformed(_))));
    }

    #[test]
    fn test_zero_count_is_malformed() {
        let fill: KalshiFill = serde_json::from_str(
            r#"{"trade_id": "z", "ticker": "X", "action": "buy", "count": 0, "yes_price": 10,
                "created_time": "2025-01-02T03:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(fill.to_trade(), Err(RelayError::Malformed(_))));
    }
}
