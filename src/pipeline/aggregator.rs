// =============================================================================
// Aggregator — folds signal records into per-ticker running statistics
// =============================================================================
//
// The fold is commutative: count and sentiment_sum depend only on the multiset
// of records, never on their order.  Sentiment is summed in fixed point so
// this holds bit for bit, not just within rounding.  Concurrent producers each fold their own
// batch into a local map; the orchestrator then merges those maps under a
// single owner, so no lock is ever held across an await.
//
// Nothing is filtered here.  Dropping low-count tickers is a downstream
// concern.
// =============================================================================

use tracing::debug;

use crate::types::{AggregateMap, SignalRecord};

pub struct Aggregator;

impl Aggregator {
    /// Fold a batch of records into a fresh aggregate map.
    pub fn ingest(batch: &[SignalRecord]) -> AggregateMap {
        let mut aggregates = AggregateMap::new();
        Self::ingest_into(&mut aggregates, batch);
        aggregates
    }

    /// Fold a batch of records into an existing map.
    pub fn ingest_into(aggregates: &mut AggregateMap, batch: &[SignalRecord]) {
        for record in batch {
            let entry = aggregates.entry(record.ticker.clone()).or_default();
            entry.count += 1;
            entry.sentiment_sum.add(record.sentiment_score);
            entry.sources.push(record.source.clone());
        }
        debug!(records = batch.len(), tickers = aggregates.len(), "batch ingested");
    }

    /// Merge a locally folded map into `into`.
    pub fn merge(into: &mut AggregateMap, local: AggregateMap) {
        for (ticker, agg) in local {
            let entry = into.entry(ticker).or_default();
            entry.count += agg.count;
            entry.sentiment_sum.merge(agg.sentiment_sum);
            entry.sources.extend(agg.sources);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ticker: &str, source: &str, score: f64) -> SignalRecord {
        SignalRecord::new(ticker, source, "text", score, "2024-01-01T00:00:00Z")
    }

    fn batch() -> Vec<SignalRecord> {
        vec![
            rec("AAPL", "Reddit: stocks", 0.25),
            rec("TSLA", "GoogleTrends", 0.1),
            rec("AAPL", "GoogleTrends", 0.5),
            rec("AAPL", "Reddit: stocks", -0.125),
            rec("NVO", "TikTok/finance", 0.75),
        ]
    }

    #[test]
    fn ingest_counts_and_sums_per_ticker() {
        let agg = Aggregator::ingest(&batch());
        assert_eq!(agg.len(), 3);
        assert_eq!(agg["AAPL"].count, 3);
        assert_eq!(agg["AAPL"].sentiment_sum.value(), 0.625);
        assert_eq!(agg["AAPL"].sources.len(), 3);
        assert_eq!(agg["TSLA"].count, 1);
    }

    #[test]
    fn ingestion_order_does_not_change_counts_sums_or_source_sets() {
        let forward = Aggregator::ingest(&batch());
        let mut reversed_batch = batch();
        reversed_batch.reverse();
        let reversed = Aggregator::ingest(&reversed_batch);
        let mut rotated_batch = batch();
        rotated_batch.rotate_left(2);
        let rotated = Aggregator::ingest(&rotated_batch);

        for other in [&reversed, &rotated] {
            for (ticker, agg) in &forward {
                let o = &other[ticker];
                assert_eq!(agg.count, o.count);
                assert_eq!(agg.sentiment_sum, o.sentiment_sum);
                assert_eq!(agg.unique_sources(), o.unique_sources());
            }
        }
    }

    #[test]
    fn merging_partial_folds_equals_single_fold() {
        let records = batch();
        let whole = Aggregator::ingest(&records);

        let mut merged = AggregateMap::new();
        Aggregator::merge(&mut merged, Aggregator::ingest(&records[3..]));
        Aggregator::merge(&mut merged, Aggregator::ingest(&records[..3]));

        for (ticker, agg) in &whole {
            assert_eq!(agg.count, merged[ticker].count);
            assert_eq!(agg.sentiment_sum, merged[ticker].sentiment_sum);
            assert_eq!(agg.unique_sources(), merged[ticker].unique_sources());
        }
    }

    #[test]
    fn non_dyadic_scores_sum_identically_across_orders_and_merges() {
        let scores = [0.1, 0.2, 0.3, -0.4767, 0.6249, 0.0772];
        let records: Vec<SignalRecord> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| rec("AMC", &format!("src{i}"), *s))
            .collect();

        let forward = Aggregator::ingest(&records);
        let mut reversed_records = records.clone();
        reversed_records.reverse();
        let reversed = Aggregator::ingest(&reversed_records);
        assert_eq!(forward["AMC"].sentiment_sum, reversed["AMC"].sentiment_sum);
        assert_eq!(forward["AMC"].sentiment_sum.value(), 0.8254);

        let singles: Vec<AggregateMap> = records
            .iter()
            .map(|r| Aggregator::ingest(std::slice::from_ref(r)))
            .collect();
        let mut merged_forward = AggregateMap::new();
        for local in singles.iter().cloned() {
            Aggregator::merge(&mut merged_forward, local);
        }
        let mut merged_reversed = AggregateMap::new();
        for local in singles.into_iter().rev() {
            Aggregator::merge(&mut merged_reversed, local);
        }
        assert_eq!(merged_forward["AMC"].sentiment_sum, forward["AMC"].sentiment_sum);
        assert_eq!(merged_reversed["AMC"].sentiment_sum, forward["AMC"].sentiment_sum);
        assert_eq!(merged_forward["AMC"].count, 6);
    }

    #[test]
    fn duplicate_sources_are_kept_until_final_dedup() {
        let agg = Aggregator::ingest(&batch());
        assert_eq!(
            agg["AAPL"]
                .sources
                .iter()
                .filter(|s| s.as_str() == "Reddit: stocks")
                .count(),
            2
        );
        assert_eq!(agg["AAPL"].unique_sources().len(), 2);
    }

    #[test]
    fn empty_batch_yields_empty_map() {
        assert!(Aggregator::ingest(&[]).is_empty());
    }
}
