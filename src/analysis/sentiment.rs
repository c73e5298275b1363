// =============================================================================
// Lexicon Sentiment — compound polarity for short social text
// =============================================================================
//
// Scoring walks the tokens once:
//   - each lexicon hit contributes its valence (roughly -4.0 .. +4.0)
//   - a booster word directly before a hit pushes it further from zero
//   - a negation within the three preceding tokens flips and damps it (×-0.74)
//   - an ALL-CAPS hit inside mixed-case text is emphasised
// Exclamation marks (up to four) then amplify the summed valence, which is
// normalised to the compound range with  x / sqrt(x² + 15).
// =============================================================================

use std::collections::HashMap;

/// Maps text to a compound polarity in [-1.0, +1.0].
pub trait SentimentScorer: Send + Sync {
    /// Empty text scores 0.0.
    fn score(&self, text: &str) -> f64;
}

const NORMALISATION_ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
const CAPS_INCREMENT: f64 = 0.733;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const NEGATION_WINDOW: usize = 3;

const LEXICON: &[(&str, f64)] = &[
    // general positive
    ("good", 1.9),
    ("great", 3.1),
    ("love", 3.2),
    ("loving", 2.9),
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("excellent", 3.2),
    ("best", 3.2),
    ("happy", 2.7),
    ("nice", 1.8),
    ("strong", 2.3),
    ("win", 2.8),
    ("winning", 2.4),
    ("winner", 2.8),
    ("profit", 1.9),
    ("profits", 1.9),
    ("gain", 2.0),
    ("gains", 1.8),
    ("growth", 1.6),
    ("beat", 1.2),
    ("upgrade", 1.6),
    ("upgraded", 1.6),
    ("bullish", 2.4),
    ("bull", 1.5),
    ("moon", 2.0),
    ("mooning", 2.4),
    ("rally", 1.9),
    ("soar", 2.2),
    ("soaring", 2.3),
    ("surge", 1.8),
    ("record", 1.0),
    ("undervalued", 1.5),
    ("buy", 0.9),
    ("calls", 0.6),
    ("rocket", 1.8),
    ("tendies", 1.9),
    ("opportunity", 1.8),
    ("confident", 2.2),
    ("exciting", 2.2),
    ("impressive", 2.4),
    ("solid", 1.7),
    ("safe", 1.9),
    ("innovative", 1.6),
    ("recovery", 1.4),
    ("outperform", 1.9),
    ("breakout", 1.5),
    // general negative
    ("bad", -2.5),
    ("terrible", -3.0),
    ("awful", -3.1),
    ("horrible", -2.5),
    ("worst", -3.1),
    ("hate", -2.7),
    ("garbage", -1.7),
    ("trash", -1.8),
    ("scam", -2.7),
    ("fraud", -2.8),
    ("fail", -2.5),
    ("failed", -2.3),
    ("failure", -2.3),
    ("loss", -1.3),
    ("losses", -1.7),
    ("lose", -1.7),
    ("losing", -1.6),
    ("weak", -1.9),
    ("risk", -1.1),
    ("risky", -1.4),
    ("crash", -2.1),
    ("crashing", -2.2),
    ("dump", -1.6),
    ("dumping", -1.8),
    ("plunge", -1.9),
    ("drop", -1.1),
    ("dropping", -1.2),
    ("fall", -1.1),
    ("falling", -1.3),
    ("bearish", -2.2),
    ("bear", -1.2),
    ("sell", -0.9),
    ("puts", -0.6),
    ("short", -0.8),
    ("overvalued", -1.6),
    ("downgrade", -1.7),
    ("downgraded", -1.7),
    ("bankrupt", -2.6),
    ("bankruptcy", -2.6),
    ("lawsuit", -1.6),
    ("recall", -1.2),
    ("warning", -1.4),
    ("worried", -1.8),
    ("fear", -2.2),
    ("panic", -2.3),
    ("bagholder", -1.6),
    ("bagholding", -1.6),
    ("miss", -1.2),
    ("missed", -1.2),
    ("disappointing", -2.2),
    ("disaster", -3.1),
    ("rekt", -2.0),
    ("underperform", -1.8),
    // emoji
    ("🚀", 2.5),
    ("📈", 1.5),
    ("💎", 1.0),
    ("🔥", 1.5),
    ("🌙", 1.2),
    ("📉", -1.5),
    ("💀", -1.6),
    ("🤡", -1.4),
    ("🩸", -1.5),
];

const BOOSTERS: &[(&str, f64)] = &[
    ("very", BOOSTER_INCREMENT),
    ("extremely", BOOSTER_INCREMENT),
    ("really", BOOSTER_INCREMENT),
    ("super", BOOSTER_INCREMENT),
    ("incredibly", BOOSTER_INCREMENT),
    ("totally", BOOSTER_INCREMENT),
    ("absolutely", BOOSTER_INCREMENT),
    ("so", BOOSTER_INCREMENT),
    ("hugely", BOOSTER_INCREMENT),
    ("barely", -BOOSTER_INCREMENT),
    ("slightly", -BOOSTER_INCREMENT),
    ("somewhat", -BOOSTER_INCREMENT),
    ("kinda", -BOOSTER_INCREMENT),
    ("marginally", -BOOSTER_INCREMENT),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nobody", "nothing", "neither", "nor", "cannot", "cant",
    "can't", "dont", "don't", "doesnt", "doesn't", "isnt", "isn't", "wont", "won't", "aint",
    "ain't", "wasnt", "wasn't", "without",
];

/// Lexicon-based scorer tuned for social-media finance chatter.
pub struct LexiconScorer {
    lexicon: HashMap<String, f64>,
    boosters: HashMap<&'static str, f64>,
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self {
            lexicon: LEXICON.iter().map(|(w, v)| (w.to_string(), *v)).collect(),
            boosters: BOOSTERS.iter().copied().collect(),
        }
    }

    fn tokenize(text: &str) -> Vec<&str> {
        text.split_whitespace()
            .flat_map(split_emoji)
            .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\''))
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }

        let tokens = Self::tokenize(text);
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let mixed_case = tokens
            .iter()
            .any(|t| t.chars().any(|c| c.is_lowercase()));

        let mut sum = 0.0;
        for (i, word) in lowered.iter().enumerate() {
            let Some(&base) = self.lexicon.get(word.as_str()) else {
                continue;
            };
            let mut valence = base;

            if mixed_case && is_shouting(tokens[i]) {
                valence += CAPS_INCREMENT * valence.signum();
            }

            if i > 0 {
                if let Some(&boost) = self.boosters.get(lowered[i - 1].as_str()) {
                    valence += boost * valence.signum();
                }
            }

            let window_start = i.saturating_sub(NEGATION_WINDOW);
            if lowered[window_start..i]
                .iter()
                .any(|w| NEGATIONS.contains(&w.as_str()))
            {
                valence *= NEGATION_SCALAR;
            }

            sum += valence;
        }

        if sum != 0.0 {
            let bangs = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64;
            sum += bangs * EXCLAMATION_INCREMENT * sum.signum();
        }

        normalise(sum)
    }
}

fn normalise(sum: f64) -> f64 {
    if sum == 0.0 {
        return 0.0;
    }
    (sum / (sum * sum + NORMALISATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

fn is_shouting(token: &str) -> bool {
    token.chars().filter(|c| c.is_alphabetic()).count() > 1
        && token
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

/// Split emoji glued to words ("moon🚀🚀") into separate tokens.
fn split_emoji(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, ch) in word.char_indices() {
        if !ch.is_ascii() && !ch.is_alphabetic() {
            if start < idx {
                parts.push(&word[start..idx]);
            }
            let end = idx + ch.len_utf8();
            parts.push(&word[idx..end]);
            start = end;
        }
    }
    if start < word.len() {
        parts.push(&word[start..]);
    }
    parts
}
