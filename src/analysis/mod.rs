// =============================================================================
// Analysis Module
// =============================================================================
//
// Text collaborators consumed by the producers and the cross-verifier:
// - Lexicon sentiment scoring (compound polarity)
// - Entity resolution (alias table + cashtags)

pub mod entity_resolution;
pub mod sentiment;

pub use entity_resolution::{AliasTable, EntityResolver};
pub use sentiment::{LexiconScorer, SentimentScorer};
