// =============================================================================
// Asymmetry Classifier — crowd sentiment vs. analyst consensus
// =============================================================================
//
// Consensus is the analyst recommendation mean: 1.0 = strong buy, 5.0 = sell.
// Rules are checked in order, first match wins:
//
//   consensus missing                      => Unknown
//   sentiment >  0.3  and consensus > 2.5  => CONTRARIAN BULL  (analysts late)
//   sentiment >  0.3  and consensus < 2.0  => CONSENSUS BULL   (priced in?)
//   sentiment < -0.3  and consensus < 2.0  => CONTRARIAN BEAR  (analysts wrong)
//   otherwise                              => Neutral
// =============================================================================

use crate::types::AsymmetryRating;

const BULLISH_SENTIMENT: f64 = 0.3;
const BEARISH_SENTIMENT: f64 = -0.3;
const ANALYSTS_CAUTIOUS: f64 = 2.5;
const ANALYSTS_BULLISH: f64 = 2.0;

pub fn classify(avg_sentiment: f64, consensus_score: Option<f64>) -> AsymmetryRating {
    let Some(consensus) = consensus_score else {
        return AsymmetryRating::Unknown;
    };

    if avg_sentiment > BULLISH_SENTIMENT && consensus > ANALYSTS_CAUTIOUS {
        AsymmetryRating::ContrarianBull
    } else if avg_sentiment > BULLISH_SENTIMENT && consensus < ANALYSTS_BULLISH {
        AsymmetryRating::ConsensusBull
    } else if avg_sentiment < BEARISH_SENTIMENT && consensus < ANALYSTS_BULLISH {
        AsymmetryRating::ContrarianBear
    } else {
        AsymmetryRating::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_consensus_always_wins() {
        assert_eq!(classify(0.5, None), AsymmetryRating::Unknown);
        assert_eq!(classify(-0.9, None), AsymmetryRating::Unknown);
    }

    #[test]
    fn decision_table() {
        assert_eq!(classify(0.5, Some(3.0)), AsymmetryRating::ContrarianBull);
        assert_eq!(classify(0.5, Some(1.5)), AsymmetryRating::ConsensusBull);
        assert_eq!(classify(-0.5, Some(1.5)), AsymmetryRating::ContrarianBear);
        assert_eq!(classify(-0.5, Some(3.5)), AsymmetryRating::Neutral);
        assert_eq!(classify(0.1, Some(1.0)), AsymmetryRating::Neutral);
    }

    #[test]
    fn thresholds_are_strict() {
        assert_eq!(classify(0.3, Some(3.0)), AsymmetryRating::Neutral);
        assert_eq!(classify(0.5, Some(2.5)), AsymmetryRating::Neutral);
        assert_eq!(classify(0.5, Some(2.0)), AsymmetryRating::Neutral);
        assert_eq!(classify(-0.3, Some(1.0)), AsymmetryRating::Neutral);
    }
}
