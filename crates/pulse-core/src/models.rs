//! Shared data models for the signal classifiers
//!
//! These are the plain value records the caller builds from ingested market and
//! trade rows. Classifier-specific inputs and results live next to their
//! classifier; anything used by more than one module lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Trade Direction
// =============================================================================

/// Side of a trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// Binary market outcome token
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Yes,
    No,
}

// =============================================================================
// Trade Events
// =============================================================================

/// A single executed trade, as produced by trade ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeEvent {
    pub trade_id: String,

    pub wallet_id: String,

    pub market_id: String,

    pub timestamp: DateTime<Utc>,

    pub side: Side,

    pub outcome: Outcome,

    /// USD notional
    pub size: f64,

    /// Price of the traded outcome token (0-1)
    pub price: f64,
}

impl TradeEvent {
    /// Price expressed in YES terms. A NO token at `p` implies YES at `1 - p`.
    pub fn yes_price(&self) -> f64 {
        match self.outcome {
            Outcome::Yes => self.price,
            Outcome::No => 1.0 - self.price,
        }
    }

    /// Signed USD flow in YES terms: buying YES or selling NO adds YES
    /// exposure (positive), the other two combinations remove it.
    pub fn yes_flow(&self) -> f64 {
        let outcome_sign = match self.outcome {
            Outcome::Yes => 1.0,
            Outcome::No => -1.0,
        };
        self.side.sign() * outcome_sign * self.size
    }
}

// =============================================================================
// Score Helpers
// =============================================================================

/// Clamp a score into the 0-100 range, mapping NaN to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Clamp a fraction into 0-1, mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Round to two decimals for display-oriented fields.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Linear interpolation of `value` between a "best" and "worst" bound, returning
/// `max_points` at or beyond `best` and 0 at or beyond `worst`. Works for both
/// lower-is-better and higher-is-better metrics.
pub fn linear_points(value: f64, best: f64, worst: f64, max_points: f64) -> f64 {
    if (worst - best).abs() < f64::EPSILON {
        return if value == best { max_points } else { 0.0 };
    }
    let fraction = (worst - value) / (worst - best);
    clamp_unit(fraction) * max_points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side, outcome: Outcome, price: f64) -> TradeEvent {
        TradeEvent {
            trade_id: "t1".to_string(),
            wallet_id: "w1".to_string(),
            market_id: "m1".to_string(),
            timestamp: Utc::now(),
            side,
            outcome,
            size: 100.0,
            price,
        }
    }

    #[test]
    fn test_yes_price_for_no_token() {
        assert!((trade(Side::Buy, Outcome::No, 0.3).yes_price() - 0.7).abs() < 1e-9);
        assert_eq!(trade(Side::Buy, Outcome::Yes, 0.3).yes_price(), 0.3);
    }

    #[test]
    fn test_yes_flow_signs() {
        assert_eq!(trade(Side::Buy, Outcome::Yes, 0.5).yes_flow(), 100.0);
        assert_eq!(trade(Side::Sell, Outcome::Yes, 0.5).yes_flow(), -100.0);
        assert_eq!(trade(Side::Buy, Outcome::No, 0.5).yes_flow(), -100.0);
        assert_eq!(trade(Side::Sell, Outcome::No, 0.5).yes_flow(), 100.0);
    }

    #[test]
    fn test_linear_points_both_directions() {
        // Lower is better: spread 0.02 best, 0.05 worst
        assert_eq!(linear_points(0.01, 0.02, 0.05, 20.0), 20.0);
        assert_eq!(linear_points(0.06, 0.02, 0.05, 20.0), 0.0);
        assert!((linear_points(0.035, 0.02, 0.05, 20.0) - 10.0).abs() < 1e-9);

        // Higher is better: depth 10k best, 1k worst
        assert_eq!(linear_points(20_000.0, 10_000.0, 1_000.0, 20.0), 20.0);
        assert_eq!(linear_points(500.0, 10_000.0, 1_000.0, 20.0), 0.0);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(150.0), 100.0);
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }
}
