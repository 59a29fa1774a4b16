//! Scoring and calibration metrics
//!
//! Pure reductions from (prediction, gold) pairs and choice probabilities to
//! aggregate numbers. Nothing here holds state or touches the network.
//!
//! Percentages are in `[0, 100]`; the Brier score is in `[0, 1]`. Empty
//! inputs reduce to zero rather than dividing by zero.

use serde::{Deserialize, Serialize};

/// Gold answer: a single string or a set of acceptable strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Gold {
    /// One acceptable answer
    One(String),
    /// Any of these answers is acceptable
    Any(Vec<String>),
}

impl Gold {
    /// Acceptable answers as a slice-like iterator
    pub fn answers(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Gold::One(s) => std::slice::from_ref(s),
            Gold::Any(v) => v,
        };
        items.iter().map(String::as_str)
    }

    /// First acceptable answer, used when rendering a demonstration
    pub fn primary(&self) -> Option<&str> {
        self.answers().next()
    }
}

impl From<&str> for Gold {
    fn from(s: &str) -> Self {
        Gold::One(s.to_string())
    }
}

const ARTICLES: [&str; 3] = ["a", "an", "the"];

// Matches Python's `string.punctuation`.
fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercase, strip punctuation, drop the articles a/an/the, collapse whitespace
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !is_punctuation(*c))
        .collect();

    // Articles are whole words: maximal runs of word characters.
    let mut without_articles = String::with_capacity(lowered.len());
    let mut word = String::new();
    for c in lowered.chars().chain(std::iter::once(' ')) {
        if is_word_char(c) {
            word.push(c);
            continue;
        }
        if ARTICLES.contains(&word.as_str()) {
            without_articles.push(' ');
        } else {
            without_articles.push_str(&word);
        }
        word.clear();
        without_articles.push(c);
    }
    without_articles.pop();

    without_articles.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized strings are equal
pub fn exact_match(pred: &str, gold: &str) -> bool {
    normalize(pred) == normalize(gold)
}

/// Normalized gold is a substring of normalized prediction
pub fn recall(pred: &str, gold: &str) -> bool {
    normalize(pred).contains(&normalize(gold))
}

fn percent(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / total as f64
    }
}

/// Exact-match and recall percentages over aligned predictions and golds
///
/// A gold set scores a hit if any member matches. The denominator is
/// `preds.len()`.
pub fn aggregate_score(preds: &[String], golds: &[Gold]) -> (f64, f64) {
    let mut em = 0;
    let mut rc = 0;
    for (pred, gold) in preds.iter().zip(golds) {
        if gold.answers().any(|g| exact_match(pred, g)) {
            em += 1;
        }
        if gold.answers().any(|g| recall(pred, g)) {
            rc += 1;
        }
    }
    (percent(em, preds.len()), percent(rc, preds.len()))
}

/// Accuracy within the answerable and abstain partitions and pooled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitAccuracy {
    /// Accuracy on golds other than the abstain label (None if no such golds)
    pub answerable: Option<f64>,
    /// Accuracy on golds equal to the abstain label (None if no such golds)
    pub abstain: Option<f64>,
    /// Accuracy over every pair (None if empty)
    pub overall: Option<f64>,
}

/// Partition pairs by whether the gold is `abstain_label` and score each side
///
/// Predictions here are chosen options, so a hit is string equality after
/// trimming.
pub fn split_accuracy(preds: &[String], golds: &[String], abstain_label: &str) -> SplitAccuracy {
    let (mut ans_hit, mut ans_total, mut abs_hit, mut abs_total) = (0, 0, 0, 0);
    for (pred, gold) in preds.iter().zip(golds) {
        let correct = pred.trim() == gold.trim();
        if gold.trim() == abstain_label {
            abs_total += 1;
            abs_hit += usize::from(correct);
        } else {
            ans_total += 1;
            ans_hit += usize::from(correct);
        }
    }
    let ratio = |hit: usize, total: usize| (total > 0).then(|| percent(hit, total));
    SplitAccuracy {
        answerable: ratio(ans_hit, ans_total),
        abstain: ratio(abs_hit, abs_total),
        overall: ratio(ans_hit + abs_hit, ans_total + abs_total),
    }
}

/// Mean squared error between abstain indicators and predicted abstain probabilities
pub fn brier_score(abstain_gold: &[bool], abstain_prob: &[f64]) -> f64 {
    let n = abstain_gold.len().min(abstain_prob.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = abstain_gold
        .iter()
        .zip(abstain_prob)
        .map(|(&gold, &p)| {
            let y = if gold { 1.0 } else { 0.0 };
            (y - p) * (y - p)
        })
        .sum();
    sum / n as f64
}

/// Knowledge-conflict match rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConflictRates {
    /// Recall against the counterfactual (substituted) answer, percent
    pub ps: f64,
    /// Recall against the original answer, percent
    pub po: f64,
    /// Memorization ratio `po / (ps + po)`, percent
    pub mr: f64,
    /// Exact match against the counterfactual answer, percent
    pub em: f64,
}

/// Match rates of predictions against counterfactual and original answers
pub fn conflict_rate(preds: &[String], original: &[Gold], counterfactual: &[Gold]) -> ConflictRates {
    let (em, ps) = aggregate_score(preds, counterfactual);
    let (_, po) = aggregate_score(preds, original);
    let mr = if ps + po > 0.0 {
        po / (ps + po) * 100.0
    } else {
        0.0
    };
    ConflictRates { ps, po, mr, em }
}

/// Exponentiate and normalize; subtracts the max first for stability
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Per-choice probabilities for one record, in choice order
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceDistribution {
    probs: Vec<f64>,
}

impl ChoiceDistribution {
    /// Softmax of raw choice log-probabilities; `None` for an empty set
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        Some(Self {
            probs: softmax(scores),
        })
    }

    /// Probabilities in choice order
    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    /// Index of the most probable choice; earliest wins ties
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.probs.iter().enumerate() {
            if *p > self.probs[best] {
                best = i;
            }
        }
        best
    }

    /// Probability at `index`
    pub fn get(&self, index: usize) -> Option<f64> {
        self.probs.get(index).copied()
    }

    /// Consume into the probability vector
    pub fn into_vec(self) -> Vec<f64> {
        self.probs
    }
}
