//! Cross-market consistency checks
//!
//! Finds pairs of markets whose questions describe related events and checks
//! whether their prices agree with that relation. An inverse pair should sum to
//! one, an earlier deadline should not trade above a later one, and so on.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConsistencyConfig;
use crate::models::{clamp_score, round2};
use crate::why::{pad_or_trim, WhyBullet, WhyBullets};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "will", "be", "is", "are", "was", "were", "of", "in", "on", "at", "to",
    "by", "for", "and", "or", "with", "this", "that", "it", "as", "from", "than", "before",
    "after", "end", "does", "do", "did", "has", "have",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "wont", "doesnt", "isnt", "didnt", "cant", "without", "fail", "fails",
];

const ANTONYMS: &[(&str, &str)] = &[
    ("win", "lose"),
    ("wins", "loses"),
    ("above", "below"),
    ("over", "under"),
    ("higher", "lower"),
    ("increase", "decrease"),
    ("rise", "fall"),
    ("pass", "reject"),
    ("approve", "reject"),
    ("yes", "no"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInput {
    pub market_id: String,
    pub question: String,
    /// Current YES price (0-1)
    pub yes_price: f64,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPairInput {
    pub market_a: MarketInput,
    pub market_b: MarketInput,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// One resolves YES exactly when the other resolves NO
    Inverse,
    /// Same event with different deadlines
    CalendarVariant,
    /// Alternative outcomes of the same event
    MultiOutcome,
    Correlated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRelationResult {
    pub market_a_id: String,
    pub market_b_id: String,
    pub relation_type: RelationType,
    /// Question similarity (0-1)
    pub similarity: f64,
    pub opposing_wording: bool,
    #[serde(default)]
    pub end_date_gap_days: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLabel {
    LooksConsistent,
    PotentialInconsistencyLow,
    PotentialInconsistencyMedium,
    PotentialInconsistencyHigh,
}

impl ConsistencyLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::LooksConsistent
        } else if score >= 60.0 {
            Self::PotentialInconsistencyLow
        } else if score >= 40.0 {
            Self::PotentialInconsistencyMedium
        } else {
            Self::PotentialInconsistencyHigh
        }
    }

    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::LooksConsistent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyCheckResult {
    pub market_a_id: String,
    pub market_b_id: String,
    pub relation_type: RelationType,
    /// 0-100, 100 means the prices fully agree with the relation
    pub score: f64,
    pub label: ConsistencyLabel,
    pub divergence: f64,
    pub threshold: f64,
    pub why_bullets: WhyBullets,
}

/// Content words of a question: lowercased, apostrophes dropped, stop words
/// and negations removed, antonyms folded onto the first word of their pair.
fn content_words(question: &str) -> HashSet<String> {
    raw_words(question)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()) && !NEGATIONS.contains(&w.as_str()))
        .map(|w| antonym_root(&w).to_string())
        .collect()
}

fn antonym_root(word: &str) -> &str {
    ANTONYMS
        .iter()
        .find(|(x, y)| word == *x || word == *y)
        .map_or(word, |&(root, _)| root)
}

fn raw_words(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of the two questions' content words.
pub fn question_similarity(a: &str, b: &str) -> f64 {
    let words_a = content_words(a);
    let words_b = content_words(b);
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

/// True when one question negates the other or uses the opposite word of an
/// antonym pair.
fn has_opposing_wording(a: &str, b: &str) -> bool {
    let words_a: HashSet<String> = raw_words(a).into_iter().collect();
    let words_b: HashSet<String> = raw_words(b).into_iter().collect();

    let negations = |words: &HashSet<String>| NEGATIONS.iter().filter(|n| words.contains(**n)).count();
    if negations(&words_a) != negations(&words_b) {
        return true;
    }

    ANTONYMS.iter().any(|(x, y)| {
        (words_a.contains(*x) && words_b.contains(*y) && !words_a.contains(*y))
            || (words_a.contains(*y) && words_b.contains(*x) && !words_a.contains(*x))
    })
}

fn same_category(a: &MarketInput, b: &MarketInput) -> bool {
    match (a.category.as_deref(), b.category.as_deref()) {
        (Some(x), Some(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        _ => false,
    }
}

fn end_date_gap_days(a: &MarketInput, b: &MarketInput) -> Option<f64> {
    match (a.end_date, b.end_date) {
        (Some(x), Some(y)) => Some((x - y).num_seconds().abs() as f64 / 86_400.0),
        _ => None,
    }
}

/// Decide how two markets relate, or `None` when their questions are not
/// similar enough to compare.
pub fn detect_relation(pair: &MarketPairInput, config: &ConsistencyConfig) -> Option<MarketRelationResult> {
    let a = &pair.market_a;
    let b = &pair.market_b;

    let similarity = question_similarity(&a.question, &b.question);
    if similarity < config.similarity_threshold {
        return None;
    }

    let opposing_wording = has_opposing_wording(&a.question, &b.question);
    let sum_gap = (a.yes_price + b.yes_price - 1.0).abs();
    let gap_days = end_date_gap_days(a, b);

    let relation_type = if opposing_wording && sum_gap <= config.inverse_sum_tolerance {
        RelationType::Inverse
    } else {
        match gap_days {
            Some(days) if same_category(a, b) && days > config.calendar_min_gap_days => {
                RelationType::CalendarVariant
            }
            Some(_) if same_category(a, b) => RelationType::MultiOutcome,
            _ => RelationType::Correlated,
        }
    };

    tracing::debug!(
        market_a = %a.market_id,
        market_b = %b.market_id,
        similarity = similarity,
        relation = ?relation_type,
        "Detected market relation"
    );

    Some(MarketRelationResult {
        market_a_id: a.market_id.clone(),
        market_b_id: b.market_id.clone(),
        relation_type,
        similarity,
        opposing_wording,
        end_date_gap_days: gap_days,
    })
}

/// Score how well the pair's prices agree with `relation`.
pub fn check_consistency(
    pair: &MarketPairInput,
    relation: RelationType,
    config: &ConsistencyConfig,
) -> ConsistencyCheckResult {
    let a = &pair.market_a;
    let b = &pair.market_b;
    let (pa, pb) = (a.yes_price, b.yes_price);

    let (divergence, threshold, evidence) = match relation {
        RelationType::Inverse => (
            (pa + pb - 1.0).abs(),
            config.inverted_divergence,
            WhyBullet::new(
                format!("Prices sum to {:.2}; an inverse pair should sum to 1.00", pa + pb),
                "price_sum",
                pa + pb,
            )
            .with_comparison("expected 1.00"),
        ),
        RelationType::CalendarVariant => {
            // The earlier deadline is the harder bar, so it should not trade higher
            let a_first = match (a.end_date, b.end_date) {
                (Some(x), Some(y)) => x <= y,
                _ => true,
            };
            let (earlier, later) = if a_first { (a, b) } else { (b, a) };
            (
                (earlier.yes_price - later.yes_price).max(0.0),
                config.calendar_spread,
                WhyBullet::new(
                    format!(
                        "Earlier deadline trades at {:.2} vs {:.2} for the later one",
                        earlier.yes_price, later.yes_price
                    ),
                    "calendar_spread",
                    earlier.yes_price - later.yes_price,
                )
                .with_comparison("earlier should not exceed later"),
            )
        }
        RelationType::MultiOutcome => (
            (pa + pb - 1.0).max(0.0),
            config.multi_outcome_excess,
            WhyBullet::new(
                format!(
                    "Exclusive outcomes sum to {:.2}, {:.2} over 1.00",
                    pa + pb,
                    (pa + pb - 1.0).max(0.0)
                ),
                "outcome_excess",
                (pa + pb - 1.0).max(0.0),
            )
            .with_comparison("expected at most 1.00"),
        ),
        RelationType::Correlated => {
            let threshold = if same_category(a, b) {
                config.correlated_divergence
            } else {
                config.correlated_divergence * config.cross_category_factor
            };
            (
                (pa - pb).abs(),
                threshold,
                WhyBullet::new(
                    format!(
                        "Question similarity {:.0}% but prices {:.2} apart",
                        question_similarity(&a.question, &b.question) * 100.0,
                        (pa - pb).abs()
                    ),
                    "similarity",
                    round2(question_similarity(&a.question, &b.question)),
                ),
            )
        }
    };

    let score = if threshold > 0.0 {
        clamp_score(100.0 - divergence / threshold * 20.0)
    } else {
        100.0
    };
    let label = ConsistencyLabel::from_score(score);

    let bullets = vec![
        WhyBullet::new(
            format!("Divergence of {:.3} against a {:.3} tolerance", divergence, threshold),
            "divergence",
            divergence,
        )
        .with_comparison(format!("tolerance {:.3}", threshold)),
        WhyBullet::new(
            format!("{} at {:.2}, {} at {:.2}", a.market_id, pa, b.market_id, pb),
            "price_gap",
            pa - pb,
        ),
        evidence,
    ];

    tracing::debug!(
        market_a = %a.market_id,
        market_b = %b.market_id,
        relation = ?relation,
        score = score,
        label = ?label,
        "Checked market consistency"
    );

    ConsistencyCheckResult {
        market_a_id: a.market_id.clone(),
        market_b_id: b.market_id.clone(),
        relation_type: relation,
        score,
        label,
        divergence,
        threshold,
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No further consistency signals")),
    }
}

/// Detect a relation and, if there is one, check the prices against it.
pub fn check_pair(pair: &MarketPairInput, config: &ConsistencyConfig) -> Option<ConsistencyCheckResult> {
    let relation = detect_relation(pair, config)?;
    Some(check_consistency(pair, relation.relation_type, config))
}
