//! Why-bullets: the evidence attached to every classifier result
//!
//! A why-bullet is one human-readable sentence backed by a number. Results
//! always carry exactly three of them, enforced by the [`WhyBullets`] array type.

use serde::{Deserialize, Serialize};

/// A single piece of numeric evidence justifying a classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhyBullet {
    /// Human-readable explanation
    pub text: String,

    /// Machine-readable metric name (e.g. "spread", "consensus_strength")
    pub metric: String,

    /// The number backing `text`. Always finite.
    pub value: f64,

    /// Unit of `value` (e.g. "%", "USD", "seconds")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// What `value` is compared against (e.g. "threshold 0.05")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<String>,
}

/// Exactly three why-bullets.
pub type WhyBullets = [WhyBullet; 3];

impl WhyBullet {
    pub fn new(text: impl Into<String>, metric: impl Into<String>, value: f64) -> Self {
        Self {
            text: text.into(),
            metric: metric.into(),
            value: finite_or_zero(value),
            unit: None,
            comparison: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_comparison(mut self, comparison: impl Into<String>) -> Self {
        self.comparison = Some(comparison.into());
        self
    }

    /// A neutral bullet used to pad results that have fewer than three signals.
    pub fn filler(text: impl Into<String>) -> Self {
        Self::new(text, "none", 0.0)
    }
}

/// Keep the first three bullets, padding with clones of `filler`.
pub fn pad_or_trim(bullets: Vec<WhyBullet>, filler: &WhyBullet) -> WhyBullets {
    let mut iter = bullets.into_iter();
    std::array::from_fn(|_| iter.next().unwrap_or_else(|| filler.clone()))
}

/// Order candidate bullets by descending magnitude. Equal magnitudes keep
/// their input order so results stay deterministic.
pub fn top_by_magnitude(mut candidates: Vec<(f64, WhyBullet)>) -> Vec<WhyBullet> {
    candidates.sort_by(|a, b| b.0.abs().total_cmp(&a.0.abs()));
    candidates.into_iter().map(|(_, bullet)| bullet).collect()
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
