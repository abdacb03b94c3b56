//! New-trade detection
//!
//! Pure functions; the caller owns the set of already observed ids.

use std::collections::HashSet;

use relay_core::Trade;

/// Trades in `fetched` whose id is not in `known`, in fetched order
pub fn detect_new_trades(known: &HashSet<String>, fetched: &[Trade]) -> Vec<Trade> {
    detect_new_trades_with(fetched, |id| known.contains(id))
}

/// Same as [`detect_new_trades`] with an arbitrary membership test
///
/// An id repeated inside `fetched` is only returned at its first position;
/// later copies never replace the first-seen values.
pub fn detect_new_trades_with<F>(fetched: &[Trade], is_known: F) -> Vec<Trade>
where
    F: Fn(&str) -> bool,
{
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut new_trades = Vec::new();

    for trade in fetched {
        if is_known(&trade.trade_id) || !emitted.insert(trade.trade_id.as_str()) {
            continue;
        }
        new_trades.push(trade.clone());
    }

    new_trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{TradeSide, TradeSource};
    use rust_decimal_macros::dec;

    fn trade(id: &str, quantity: u32) -> Trade {
        Trade {
            timestamp: 0.0,
            ticker: "T".to_string(),
            side: TradeSide::Buy,
            quantity,
            price: dec!(0.5),
            trade_id: id.to_string(),
            source: TradeSource::AgentLive,
        }
    }

    fn ids(trades: &[Trade]) -> Vec<&str> {
        trades.iter().map(|t| t.trade_id.as_str()).collect()
    }

    fn known_from(trades: &[Trade]) -> HashSet<String> {
        trades.iter().map(|t| t.trade_id.clone()).collect()
    }

    #[test]
    fn test_first_fetch_is_all_new() {
        let l1 = vec![trade("a1", 1), trade("a2", 1)];
        let new = detect_new_trades(&HashSet::new(), &l1);
        assert_eq!(ids(&new), vec!["a1", "a2"]);
    }

    #[test]
    fn test_overlapping_window() {
        let l1 = vec![trade("a1", 1), trade("a2", 1)];
        let l2 = vec![trade("a2", 1), trade("a3", 1)];

        let new = detect_new_trades(&known_from(&l1), &l2);
        assert_eq!(ids(&new), vec!["a3"]);
    }

    #[test]
    fn test_returns_exactly_absent_ids_in_fetched_order() {
        let l1 = vec![trade("b", 1), trade("d", 1)];
        let l2 = vec![
            trade("e", 1),
            trade("d", 1),
            trade("c", 1),
            trade("b", 1),
            trade("a", 1),
        ];

        let new = detect_new_trades(&known_from(&l1), &l2);
        assert_eq!(ids(&new), vec!["e", "c", "a"]);
    }

    #[test]
    fn test_known_id_with_changed_fields_is_not_new() {
        let known = known_from(&[trade("x", 1)]);
        let new = detect_new_trades(&known, &[trade("x", 99)]);
        assert!(new.is_empty());
    }

    #[test]
    fn test_duplicate_inside_fetch_keeps_first() {
        let fetched = vec![trade("n", 1), trade("n", 7)];
        let new = detect_new_trades(&HashSet::new(), &fetched);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].quantity, 1);
    }
}
