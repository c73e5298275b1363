// =============================================================================
// Velocity — run-over-run change in signal count
// =============================================================================

use std::collections::BTreeMap;

use crate::types::{AggregateMap, HistorySnapshot};

/// velocity = current count − previous count, previous defaulting to 0.
///
/// Only tickers with current-run signal are scored; tickers that exist only
/// in the previous snapshot are ignored.
pub fn compute(current: &AggregateMap, previous: &HistorySnapshot) -> BTreeMap<String, i64> {
    current
        .iter()
        .map(|(ticker, agg)| {
            let prev = previous.get(ticker).map(|h| h.count).unwrap_or(0);
            (ticker.clone(), agg.count as i64 - prev as i64)
        })
        .collect()
}
