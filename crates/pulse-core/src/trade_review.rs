//! Trade execution review
//!
//! Grades the process quality of a single trade against the market conditions
//! at entry. Five components add up to a 0-100 score:
//!
//! | Component        | Points |
//! |------------------|--------|
//! | Spread quality   | 0-20   |
//! | Depth quality    | 0-20   |
//! | Chasing          | 0-30   |
//! | Market state     | 0-20   |
//! | Personal history | 0-10   |
//!
//! The score maps to a label, after which [`apply_chasing_override`] forces
//! `poor_timing` for any trade entered after a large 15 minute move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TradeReviewConfig;
use crate::market_state::MarketStateLabel;
use crate::models::{clamp_score, linear_points, Side};
use crate::why::{pad_or_trim, top_by_magnitude, WhyBullet, WhyBullets};

const SPREAD_POINTS: f64 = 20.0;
const DEPTH_POINTS: f64 = 20.0;
const CHASING_POINTS: f64 = 30.0;
const STATE_POINTS: f64 = 20.0;
const HISTORY_POINTS: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeInput {
    pub trade_id: String,
    pub wallet_id: String,
    pub market_id: String,
    pub side: Side,
    /// USD notional
    pub notional: f64,
    pub timestamp: DateTime<Utc>,
}

/// Market conditions around the trade. Every field may be unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeContext {
    #[serde(default)]
    pub spread_at_entry: Option<f64>,
    #[serde(default)]
    pub depth_at_entry: Option<f64>,
    /// Fractional price change over the 5 minutes before entry
    #[serde(default)]
    pub price_change_5m: Option<f64>,
    /// Fractional price change over the 15 minutes before entry
    #[serde(default)]
    pub price_change_15m: Option<f64>,
    #[serde(default)]
    pub market_state_at_entry: Option<MarketStateLabel>,
    /// Volume at entry relative to the market's normal volume
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    /// The wallet's own median entry spread
    #[serde(default)]
    pub user_median_spread: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeReviewLabel {
    GoodProcess,
    AcceptableProcess,
    RiskyProcess,
    PoorTiming,
}

impl TradeReviewLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            TradeReviewLabel::GoodProcess
        } else if score >= 50.0 {
            TradeReviewLabel::AcceptableProcess
        } else if score >= 30.0 {
            TradeReviewLabel::RiskyProcess
        } else {
            TradeReviewLabel::PoorTiming
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeReviewComponents {
    pub spread: f64,
    pub depth: f64,
    pub chasing: f64,
    pub market_state: f64,
    pub history: f64,
}

impl TradeReviewComponents {
    pub fn total(&self) -> f64 {
        self.spread + self.depth + self.chasing + self.market_state + self.history
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeReviewResult {
    pub trade_id: String,
    pub wallet_id: String,
    pub market_id: String,
    pub label: TradeReviewLabel,
    /// 0-100
    pub score: f64,
    /// Share of key context fields that were known (0-100)
    pub confidence: f64,
    pub components: TradeReviewComponents,
    /// Whether the label was forced by the chasing override
    pub chasing_override: bool,
    pub why_bullets: WhyBullets,
}

/// One scored component and the bullet explaining it
struct Scored {
    points: f64,
    neutral: f64,
    bullet: Option<WhyBullet>,
}

impl Scored {
    fn magnitude(&self) -> f64 {
        (self.points - self.neutral).abs()
    }
}

fn score_spread(context: &TradeContext, config: &TradeReviewConfig) -> Scored {
    let neutral = SPREAD_POINTS / 2.0;
    match context.spread_at_entry {
        None => Scored { points: neutral, neutral, bullet: None },
        Some(spread) => {
            let points = linear_points(spread, config.spread_good, config.spread_bad, SPREAD_POINTS);
            let verdict = if spread <= config.spread_good {
                "tight"
            } else if spread >= config.spread_bad {
                "wide"
            } else {
                "moderate"
            };
            Scored {
                points,
                neutral,
                bullet: Some(
                    WhyBullet::new(
                        format!("Entered at a {} spread of {:.3}", verdict, spread),
                        "spread_at_entry",
                        spread,
                    )
                    .with_comparison(format!(
                        "good at or below {}, bad at or above {}",
                        config.spread_good, config.spread_bad
                    )),
                ),
            }
        }
    }
}

fn score_depth(context: &TradeContext, config: &TradeReviewConfig) -> Scored {
    let neutral = DEPTH_POINTS / 2.0;
    match context.depth_at_entry {
        None => Scored { points: neutral, neutral, bullet: None },
        Some(depth) => {
            let points = linear_points(depth, config.depth_good, config.depth_bad, DEPTH_POINTS);
            Scored {
                points,
                neutral,
                bullet: Some(
                    WhyBullet::new(
                        format!("${:.0} of depth available at entry", depth),
                        "depth_at_entry",
                        depth,
                    )
                    .with_unit("USD")
                    .with_comparison(format!(
                        "good at or above ${:.0}, thin at or below ${:.0}",
                        config.depth_good, config.depth_bad
                    )),
                ),
            }
        }
    }
}

fn score_chasing(trade: &TradeInput, context: &TradeContext, config: &TradeReviewConfig) -> Scored {
    let neutral = CHASING_POINTS / 2.0;
    let (change, window) = match (context.price_change_15m, context.price_change_5m) {
        (Some(change), _) => (change, "15m"),
        (None, Some(change)) => (change, "5m"),
        (None, None) => return Scored { points: neutral, neutral, bullet: None },
    };

    let magnitude = change.abs();
    let directional = change * trade.side.sign();

    let (points, text) = if magnitude < config.stable_threshold {
        (
            CHASING_POINTS,
            format!("Price stable before entry ({:+.1}% over {})", change * 100.0, window),
        )
    } else if directional > config.chase_threshold {
        (
            0.0,
            format!(
                "Chased a {:+.1}% move over {} in the trade direction",
                change * 100.0,
                window
            ),
        )
    } else {
        let span = config.chase_threshold - config.stable_threshold;
        let fraction = (magnitude - config.stable_threshold) / span;
        (
            (CHASING_POINTS * (1.0 - fraction)).clamp(0.0, CHASING_POINTS),
            format!("Price moved {:+.1}% over {} before entry", change * 100.0, window),
        )
    };

    Scored {
        points,
        neutral,
        bullet: Some(
            WhyBullet::new(text, format!("price_change_{}", window), change * 100.0)
                .with_unit("%")
                .with_comparison(format!(
                    "chasing above {:.1}%",
                    config.chase_threshold * 100.0
                )),
        ),
    }
}

fn score_market_state(context: &TradeContext) -> Scored {
    let neutral = STATE_POINTS / 2.0;
    match context.market_state_at_entry {
        None => Scored { points: neutral, neutral, bullet: None },
        Some(state) => {
            let (points, description) = match state {
                MarketStateLabel::CalmLiquid => (20.0, "a calm, liquid market"),
                MarketStateLabel::Jumpy => (10.0, "a jumpy market"),
                MarketStateLabel::ThinSlippage => (5.0, "a thin market prone to slippage"),
                MarketStateLabel::EventDriven => (5.0, "an event-driven market"),
            };
            Scored {
                points,
                neutral,
                bullet: Some(
                    WhyBullet::new(
                        format!("Entered during {}", description),
                        "market_state_points",
                        points,
                    )
                    .with_comparison(format!("out of {}", STATE_POINTS)),
                ),
            }
        }
    }
}

fn score_history(context: &TradeContext, config: &TradeReviewConfig) -> Scored {
    let neutral = HISTORY_POINTS / 2.0;
    match (context.spread_at_entry, context.user_median_spread) {
        (Some(spread), Some(median)) if median > 0.0 => {
            let ratio = spread / median;
            let points = linear_points(
                ratio,
                config.history_better_ratio,
                config.history_worse_ratio,
                HISTORY_POINTS,
            );
            let verdict = if ratio <= config.history_better_ratio {
                "better than"
            } else if ratio >= config.history_worse_ratio {
                "worse than"
            } else {
                "in line with"
            };
            Scored {
                points,
                neutral,
                bullet: Some(
                    WhyBullet::new(
                        format!("Entry spread {} your usual ({:.2}x median)", verdict, ratio),
                        "spread_vs_personal_median",
                        ratio,
                    )
                    .with_unit("x")
                    .with_comparison(format!("personal median {:.3}", median)),
                ),
            }
        }
        _ => Scored { points: neutral, neutral, bullet: None },
    }
}

/// Forces `poor_timing` when the 15 minute move exceeds the chase threshold.
/// Kept apart from scoring so the policy is visible on its own.
pub fn apply_chasing_override(
    label: TradeReviewLabel,
    context: &TradeContext,
    config: &TradeReviewConfig,
) -> (TradeReviewLabel, bool) {
    match context.price_change_15m {
        Some(change) if change.abs() > config.chase_threshold => (TradeReviewLabel::PoorTiming, true),
        _ => (label, false),
    }
}

/// Review one trade's execution quality.
pub fn review_trade(
    trade: &TradeInput,
    context: &TradeContext,
    config: &TradeReviewConfig,
) -> TradeReviewResult {
    let spread = score_spread(context, config);
    let depth = score_depth(context, config);
    let chasing = score_chasing(trade, context, config);
    let state = score_market_state(context);
    let history = score_history(context, config);

    let components = TradeReviewComponents {
        spread: spread.points,
        depth: depth.points,
        chasing: chasing.points,
        market_state: state.points,
        history: history.points,
    };
    let score = clamp_score(components.total());

    let mut candidates: Vec<(f64, WhyBullet)> = [spread, depth, chasing, state, history]
        .into_iter()
        .filter_map(|scored| {
            let magnitude = scored.magnitude();
            scored.bullet.map(|bullet| (magnitude, bullet))
        })
        .collect();

    if let Some(ratio) = context.volume_ratio {
        if ratio >= config.volume_spike_ratio {
            candidates.push((
                0.0,
                WhyBullet::new(
                    format!("Entered during a volume spike ({:.1}x normal)", ratio),
                    "volume_ratio",
                    ratio,
                )
                .with_unit("x")
                .with_comparison(format!("spike at {}x", config.volume_spike_ratio)),
            ));
        }
    }

    let why_bullets = pad_or_trim(
        top_by_magnitude(candidates),
        &WhyBullet::filler("Not enough market context to say more"),
    );

    let (label, chasing_override) =
        apply_chasing_override(TradeReviewLabel::from_score(score), context, config);

    let known = [
        context.spread_at_entry.is_some(),
        context.depth_at_entry.is_some(),
        context.price_change_15m.is_some(),
        context.market_state_at_entry.is_some(),
    ]
    .iter()
    .filter(|k| **k)
    .count();
    let confidence = known as f64 / 4.0 * 100.0;

    tracing::debug!(
        trade_id = %trade.trade_id,
        score = score,
        label = ?label,
        chasing_override = chasing_override,
        "Reviewed trade"
    );

    TradeReviewResult {
        trade_id: trade.trade_id.clone(),
        wallet_id: trade.wallet_id.clone(),
        market_id: trade.market_id.clone(),
        label,
        score,
        confidence,
        components,
        chasing_override,
        why_bullets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side) -> TradeInput {
        TradeInput {
            trade_id: "t1".to_string(),
            wallet_id: "w1".to_string(),
            market_id: "m1".to_string(),
            side,
            notional: 500.0,
            timestamp: DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn ideal_context() -> TradeContext {
        TradeContext {
            spread_at_entry: Some(0.01),
            depth_at_entry: Some(50_000.0),
            price_change_5m: Some(0.0),
            price_change_15m: Some(0.001),
            market_state_at_entry: Some(MarketStateLabel::CalmLiquid),
            volume_ratio: Some(1.0),
            user_median_spread: Some(0.02),
        }
    }

    #[test]
    fn test_ideal_trade_is_good_process() {
        let result = review_trade(&trade(Side::Buy), &ideal_context(), &TradeReviewConfig::default());
        assert_eq!(result.score, 100.0);
        assert_eq!(result.label, TradeReviewLabel::GoodProcess);
        assert_eq!(result.confidence, 100.0);
        assert!(!result.chasing_override);
    }

    #[test]
    fn test_ten_percent_run_up_forces_poor_timing() {
        let context = TradeContext {
            price_change_15m: Some(0.10),
            ..ideal_context()
        };
        let result = review_trade(&trade(Side::Buy), &context, &TradeReviewConfig::default());

        // Every other component is perfect: 20 + 20 + 0 + 20 + 10
        assert_eq!(result.score, 70.0);
        assert_eq!(result.components.chasing, 0.0);
        assert_eq!(result.label, TradeReviewLabel::PoorTiming);
        assert!(result.chasing_override);
        assert_eq!(result.why_bullets[0].metric, "price_change_15m");
    }

    #[test]
    fn test_override_applies_to_adverse_moves_too() {
        let context = TradeContext {
            price_change_15m: Some(-0.05),
            ..ideal_context()
        };
        let result = review_trade(&trade(Side::Buy), &context, &TradeReviewConfig::default());
        assert_eq!(result.label, TradeReviewLabel::PoorTiming);
    }

    #[test]
    fn test_override_is_independent_of_score() {
        let config = TradeReviewConfig::default();
        let calm = TradeContext {
            price_change_15m: Some(0.01),
            ..Default::default()
        };
        assert_eq!(
            apply_chasing_override(TradeReviewLabel::GoodProcess, &calm, &config),
            (TradeReviewLabel::GoodProcess, false)
        );

        let chased = TradeContext {
            price_change_15m: Some(0.031),
            ..Default::default()
        };
        assert_eq!(
            apply_chasing_override(TradeReviewLabel::GoodProcess, &chased, &config),
            (TradeReviewLabel::PoorTiming, true)
        );
    }

    #[test]
    fn test_sell_after_drop_is_chasing() {
        let context = TradeContext {
            price_change_15m: None,
            price_change_5m: Some(-0.04),
            ..ideal_context()
        };
        let result = review_trade(&trade(Side::Sell), &context, &TradeReviewConfig::default());
        assert_eq!(result.components.chasing, 0.0);
        // 5m fallback does not trigger the 15m override
        assert!(!result.chasing_override);
    }

    #[test]
    fn test_partial_chasing_credit() {
        let context = TradeContext {
            price_change_15m: Some(0.0175),
            ..ideal_context()
        };
        let result = review_trade(&trade(Side::Buy), &context, &TradeReviewConfig::default());
        assert!((result.components.chasing - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_context_is_neutral() {
        let result = review_trade(&trade(Side::Buy), &TradeContext::default(), &TradeReviewConfig::default());

        assert_eq!(result.score, 50.0);
        assert_eq!(result.label, TradeReviewLabel::AcceptableProcess);
        assert_eq!(result.confidence, 0.0);
        assert!(result.why_bullets.iter().all(|b| b.metric == "none"));
    }

    #[test]
    fn test_wide_spread_and_thin_book() {
        let context = TradeContext {
            spread_at_entry: Some(0.08),
            depth_at_entry: Some(500.0),
            price_change_15m: Some(0.02),
            market_state_at_entry: Some(MarketStateLabel::ThinSlippage),
            user_median_spread: Some(0.02),
            ..Default::default()
        };
        let result = review_trade(&trade(Side::Buy), &context, &TradeReviewConfig::default());

        assert_eq!(result.components.spread, 0.0);
        assert_eq!(result.components.depth, 0.0);
        assert_eq!(result.components.history, 0.0);
        assert_eq!(result.label, TradeReviewLabel::PoorTiming);
        assert!(!result.chasing_override);
    }
}
