//! Market state classification
//!
//! Labels a market's current microstructure from live spread, depth,
//! staleness and volatility features. Missing features never fail the
//! classification; they only lower its confidence.

use serde::{Deserialize, Serialize};

use crate::config::MarketStateConfig;
use crate::why::{pad_or_trim, top_by_magnitude, WhyBullet, WhyBullets};

/// Confidence shift (points) that counts as a state change on its own
pub const STATE_CONFIDENCE_DELTA: f64 = 15.0;

/// Number of features in [`MarketFeaturesInput`]
const FEATURE_COUNT: usize = 7;

/// Point-in-time microstructure snapshot for one market
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketFeaturesInput {
    pub market_id: String,
    #[serde(default)]
    pub spread: Option<f64>,
    /// Order book depth in USD
    #[serde(default)]
    pub depth: Option<f64>,
    /// Seconds since the last book update
    #[serde(default)]
    pub staleness: Option<f64>,
    /// Short-horizon price volatility proxy
    #[serde(default)]
    pub vol_proxy: Option<f64>,
    /// Estimated price impact of a reference order
    #[serde(default)]
    pub impact_proxy: Option<f64>,
    #[serde(default)]
    pub trade_count: Option<u64>,
    #[serde(default)]
    pub volume_usd: Option<f64>,
}

impl MarketFeaturesInput {
    pub fn present_count(&self) -> usize {
        [
            self.spread.is_some(),
            self.depth.is_some(),
            self.staleness.is_some(),
            self.vol_proxy.is_some(),
            self.impact_proxy.is_some(),
            self.trade_count.is_some(),
            self.volume_usd.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Optional historical baselines for relative comparisons
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoricalAverages {
    #[serde(default)]
    pub avg_spread: Option<f64>,
    #[serde(default)]
    pub avg_depth: Option<f64>,
    #[serde(default)]
    pub avg_volume_usd: Option<f64>,
    #[serde(default)]
    pub avg_trade_count: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketStateLabel {
    CalmLiquid,
    ThinSlippage,
    Jumpy,
    EventDriven,
}

impl MarketStateLabel {
    /// Tie-break order
    const ALL: [MarketStateLabel; 4] = [
        MarketStateLabel::CalmLiquid,
        MarketStateLabel::ThinSlippage,
        MarketStateLabel::Jumpy,
        MarketStateLabel::EventDriven,
    ];

    fn index(self) -> usize {
        match self {
            MarketStateLabel::CalmLiquid => 0,
            MarketStateLabel::ThinSlippage => 1,
            MarketStateLabel::Jumpy => 2,
            MarketStateLabel::EventDriven => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStateResult {
    pub market_id: String,
    pub state_label: MarketStateLabel,
    /// 0-100
    pub confidence: f64,
    pub why_bullets: WhyBullets,
    pub features: MarketFeaturesInput,
}

/// Accumulates evidence weight per state plus the bullet explaining it.
struct Evidence {
    weights: [f64; 4],
    bullets: Vec<(f64, WhyBullet)>,
}

impl Evidence {
    fn new() -> Self {
        Self {
            weights: [0.0; 4],
            bullets: Vec::new(),
        }
    }

    fn add(&mut self, contributions: &[(MarketStateLabel, f64)], bullet: WhyBullet) {
        let mut total = 0.0;
        for (label, weight) in contributions {
            self.weights[label.index()] += weight;
            total += weight;
        }
        self.bullets.push((total, bullet));
    }

    fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    fn winner(&self) -> (MarketStateLabel, f64) {
        let mut best = (MarketStateLabel::CalmLiquid, self.weights[0]);
        for label in MarketStateLabel::ALL.iter().skip(1) {
            let weight = self.weights[label.index()];
            if weight > best.1 {
                best = (*label, weight);
            }
        }
        best
    }
}

/// Classify a market's current state.
pub fn classify_market_state(
    features: &MarketFeaturesInput,
    config: &MarketStateConfig,
    history: Option<&HistoricalAverages>,
) -> MarketStateResult {
    use MarketStateLabel::*;

    let mut evidence = Evidence::new();

    if let Some(spread) = features.spread {
        if spread <= config.spread_tight {
            evidence.add(
                &[(CalmLiquid, 2.0)],
                WhyBullet::new(format!("Tight spread of {:.3}", spread), "spread", spread)
                    .with_comparison(format!("tight at or below {}", config.spread_tight)),
            );
        } else if spread >= config.spread_jumpy {
            evidence.add(
                &[(Jumpy, 1.5), (ThinSlippage, 0.5)],
                WhyBullet::new(format!("Wide spread of {:.3}", spread), "spread", spread)
                    .with_comparison(format!("wide at or above {}", config.spread_jumpy)),
            );
        } else {
            evidence.add(
                &[(ThinSlippage, 0.75)],
                WhyBullet::new(format!("Moderate spread of {:.3}", spread), "spread", spread)
                    .with_comparison(format!(
                        "between {} and {}",
                        config.spread_tight, config.spread_jumpy
                    )),
            );
        }
    }

    if let Some(depth) = features.depth {
        if depth < config.depth_low {
            evidence.add(
                &[(ThinSlippage, 2.0)],
                WhyBullet::new(format!("Only ${:.0} of book depth", depth), "depth", depth)
                    .with_unit("USD")
                    .with_comparison(format!("thin below ${:.0}", config.depth_low)),
            );
        } else if depth >= config.depth_high {
            evidence.add(
                &[(CalmLiquid, 1.5)],
                WhyBullet::new(format!("Deep book with ${:.0}", depth), "depth", depth)
                    .with_unit("USD")
                    .with_comparison(format!("deep at or above ${:.0}", config.depth_high)),
            );
        } else {
            evidence.add(
                &[(CalmLiquid, 0.5)],
                WhyBullet::new(format!("Adequate depth of ${:.0}", depth), "depth", depth)
                    .with_unit("USD"),
            );
        }
    }

    if let Some(staleness) = features.staleness {
        if staleness > config.staleness_high {
            evidence.add(
                &[(ThinSlippage, 1.0)],
                WhyBullet::new(
                    format!("No book update for {:.0}s", staleness),
                    "staleness",
                    staleness,
                )
                .with_unit("seconds")
                .with_comparison(format!("stale after {:.0}s", config.staleness_high)),
            );
        } else {
            evidence.add(
                &[(CalmLiquid, 0.5)],
                WhyBullet::new(
                    format!("Book updated {:.0}s ago", staleness),
                    "staleness",
                    staleness,
                )
                .with_unit("seconds"),
            );
        }
    }

    if let Some(vol) = features.vol_proxy {
        if vol >= config.vol_event {
            evidence.add(
                &[(EventDriven, 2.5)],
                WhyBullet::new(
                    format!("Volatility {:.1}% suggests news-driven repricing", vol * 100.0),
                    "vol_proxy",
                    vol,
                )
                .with_comparison(format!("event level at {}", config.vol_event)),
            );
        } else if vol >= config.vol_high {
            evidence.add(
                &[(Jumpy, 2.0)],
                WhyBullet::new(format!("Elevated volatility {:.1}%", vol * 100.0), "vol_proxy", vol)
                    .with_comparison(format!("high at {}", config.vol_high)),
            );
        } else {
            evidence.add(
                &[(CalmLiquid, 1.0)],
                WhyBullet::new(format!("Low volatility {:.1}%", vol * 100.0), "vol_proxy", vol)
                    .with_comparison(format!("below {}", config.vol_high)),
            );
        }
    }

    if let Some(impact) = features.impact_proxy {
        if impact >= config.impact_high {
            evidence.add(
                &[(ThinSlippage, 1.5)],
                WhyBullet::new(
                    format!("Reference order moves price {:.1}%", impact * 100.0),
                    "impact_proxy",
                    impact,
                )
                .with_comparison(format!("high at {}", config.impact_high)),
            );
        } else {
            evidence.add(
                &[(CalmLiquid, 0.5)],
                WhyBullet::new(
                    format!("Low price impact {:.1}%", impact * 100.0),
                    "impact_proxy",
                    impact,
                ),
            );
        }
    }

    if let Some(history) = history {
        if let (Some(spread), Some(avg)) = (features.spread, history.avg_spread) {
            if avg > 0.0 && spread > 2.0 * avg {
                evidence.add(
                    &[(Jumpy, 1.0)],
                    WhyBullet::new(
                        format!("Spread is {:.1}x its usual level", spread / avg),
                        "spread_vs_avg",
                        spread / avg,
                    )
                    .with_unit("x")
                    .with_comparison(format!("average {:.3}", avg)),
                );
            }
        }

        if let (Some(depth), Some(avg)) = (features.depth, history.avg_depth) {
            if avg > 0.0 && depth < 0.5 * avg {
                evidence.add(
                    &[(ThinSlippage, 1.0)],
                    WhyBullet::new(
                        format!("Depth is {:.0}% of its usual level", depth / avg * 100.0),
                        "depth_vs_avg",
                        depth / avg,
                    )
                    .with_unit("x")
                    .with_comparison(format!("average ${:.0}", avg)),
                );
            }
        }

        if let (Some(volume), Some(avg)) = (features.volume_usd, history.avg_volume_usd) {
            if avg > 0.0 && volume >= config.surge_multiple * avg {
                evidence.add(
                    &[(EventDriven, 2.0)],
                    WhyBullet::new(
                        format!("Volume surge: {:.1}x the usual ${:.0}", volume / avg, avg),
                        "volume_vs_avg",
                        volume / avg,
                    )
                    .with_unit("x")
                    .with_comparison(format!("surge at {}x", config.surge_multiple)),
                );
            }
        }

        if let (Some(count), Some(avg)) = (features.trade_count, history.avg_trade_count) {
            let count = count as f64;
            if avg > 0.0 && count >= config.surge_multiple * avg {
                evidence.add(
                    &[(EventDriven, 1.0)],
                    WhyBullet::new(
                        format!("{:.0} trades vs a usual {:.0}", count, avg),
                        "trade_count_vs_avg",
                        count / avg,
                    )
                    .with_unit("x"),
                );
            }
        }
    }

    let present = features.present_count();
    let total = evidence.total();
    let (state_label, winning_weight) = evidence.winner();

    let share = if total > 0.0 {
        winning_weight / total * 100.0
    } else {
        50.0
    };
    let completeness = 0.5 + 0.5 * present as f64 / FEATURE_COUNT as f64;
    let confidence = (share * completeness).clamp(10.0, 95.0);

    let filler = WhyBullet::new(
        format!("{} of {} features available", present, FEATURE_COUNT),
        "features_available",
        present as f64,
    );
    let why_bullets = pad_or_trim(top_by_magnitude(evidence.bullets), &filler);

    tracing::debug!(
        market_id = %features.market_id,
        state = ?state_label,
        confidence = confidence,
        features_present = present,
        "Classified market state"
    );

    MarketStateResult {
        market_id: features.market_id.clone(),
        state_label,
        confidence,
        why_bullets,
        features: features.clone(),
    }
}

/// Whether a state transition is worth persisting: the label changed, or the
/// confidence moved by more than [`STATE_CONFIDENCE_DELTA`].
pub fn has_state_changed(
    prev: MarketStateLabel,
    next: MarketStateLabel,
    prev_confidence: f64,
    next_confidence: f64,
) -> bool {
    prev != next || (next_confidence - prev_confidence).abs() > STATE_CONFIDENCE_DELTA
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> MarketFeaturesInput {
        MarketFeaturesInput {
            market_id: "m1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_null_features_still_classify() {
        let result = classify_market_state(&features(), &MarketStateConfig::default(), None);

        assert_eq!(result.state_label, MarketStateLabel::CalmLiquid);
        assert!(result.confidence > 0.0);
        assert_eq!(result.why_bullets.len(), 3);
        assert_eq!(result.why_bullets[0].metric, "features_available");
        assert_eq!(result.why_bullets[0].value, 0.0);
    }

    #[test]
    fn test_calm_liquid_market() {
        let input = MarketFeaturesInput {
            spread: Some(0.01),
            depth: Some(50_000.0),
            staleness: Some(10.0),
            vol_proxy: Some(0.01),
            impact_proxy: Some(0.002),
            trade_count: Some(120),
            volume_usd: Some(40_000.0),
            ..features()
        };
        let result = classify_market_state(&input, &MarketStateConfig::default(), None);

        assert_eq!(result.state_label, MarketStateLabel::CalmLiquid);
        assert!(result.confidence >= 90.0);
        assert_eq!(result.why_bullets[0].metric, "spread");
    }

    #[test]
    fn test_thin_book() {
        let input = MarketFeaturesInput {
            spread: Some(0.04),
            depth: Some(300.0),
            staleness: Some(3_600.0),
            impact_proxy: Some(0.05),
            ..features()
        };
        let result = classify_market_state(&input, &MarketStateConfig::default(), None);
        assert_eq!(result.state_label, MarketStateLabel::ThinSlippage);
    }

    #[test]
    fn test_event_driven_with_volume_surge() {
        let input = MarketFeaturesInput {
            spread: Some(0.03),
            depth: Some(5_000.0),
            vol_proxy: Some(0.2),
            volume_usd: Some(500_000.0),
            ..features()
        };
        let history = HistoricalAverages {
            avg_volume_usd: Some(50_000.0),
            ..Default::default()
        };
        let result =
            classify_market_state(&input, &MarketStateConfig::default(), Some(&history));

        assert_eq!(result.state_label, MarketStateLabel::EventDriven);
        assert_eq!(result.why_bullets[0].metric, "vol_proxy");
        assert_eq!(result.why_bullets[1].metric, "volume_vs_avg");
    }

    #[test]
    fn test_jumpy_market() {
        let input = MarketFeaturesInput {
            spread: Some(0.08),
            depth: Some(5_000.0),
            vol_proxy: Some(0.07),
            ..features()
        };
        let result = classify_market_state(&input, &MarketStateConfig::default(), None);
        assert_eq!(result.state_label, MarketStateLabel::Jumpy);
    }

    #[test]
    fn test_missing_features_lower_confidence() {
        let config = MarketStateConfig::default();
        let full = MarketFeaturesInput {
            spread: Some(0.01),
            depth: Some(50_000.0),
            staleness: Some(10.0),
            vol_proxy: Some(0.01),
            impact_proxy: Some(0.002),
            trade_count: Some(120),
            volume_usd: Some(40_000.0),
            ..features()
        };
        let partial = MarketFeaturesInput {
            spread: Some(0.01),
            ..features()
        };

        let full_conf = classify_market_state(&full, &config, None).confidence;
        let partial_conf = classify_market_state(&partial, &config, None).confidence;
        assert!(partial_conf < full_conf);
    }

    #[test]
    fn test_has_state_changed() {
        use MarketStateLabel::*;
        assert!(has_state_changed(CalmLiquid, Jumpy, 80.0, 80.0));
        assert!(!has_state_changed(CalmLiquid, CalmLiquid, 80.0, 70.0));
        assert!(!has_state_changed(CalmLiquid, CalmLiquid, 80.0, 65.0));
        assert!(has_state_changed(CalmLiquid, CalmLiquid, 80.0, 64.0));
    }
}
