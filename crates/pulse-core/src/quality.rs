//! Market quality scoring
//!
//! Grades how tradable a single market is from its spread, depth, volume,
//! staleness and resolution clarity.

use serde::{Deserialize, Serialize};

use crate::config::{QualityConfig, TierTable};
use crate::models::{clamp_score, clamp_unit, round2};
use crate::why::{pad_or_trim, top_by_magnitude, WhyBullet, WhyBullets};

/// Sub-score every component is measured against when picking bullets
const NEUTRAL_SUB_SCORE: f64 = 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQualityInput {
    pub spread: f64,
    /// Order book depth in USD
    pub depth: f64,
    pub volume_24h: f64,
    /// Hours since the last market update
    pub staleness_hours: f64,
    /// How unambiguous the resolution criteria are (0-1)
    pub resolution_clarity: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityGrade {
    A,
    B,
    C,
    D,
    F,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityGrade::A
        } else if score >= 75.0 {
            QualityGrade::B
        } else if score >= 60.0 {
            QualityGrade::C
        } else if score >= 40.0 {
            QualityGrade::D
        } else {
            QualityGrade::F
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityComponents {
    pub spread: f64,
    pub depth: f64,
    pub volume: f64,
    pub staleness: f64,
    pub clarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQualityResult {
    /// Weighted score (0-100)
    pub score: f64,
    pub grade: QualityGrade,
    pub components: QualityComponents,
    pub why_bullets: WhyBullets,
}

impl TierTable {
    /// Tier points for a metric where smaller values are better (spread, staleness).
    pub fn score_lower_better(&self, value: f64) -> f64 {
        if value <= self.excellent {
            100.0
        } else if value <= self.good {
            80.0
        } else if value <= self.fair {
            60.0
        } else if value <= self.poor {
            40.0
        } else {
            20.0
        }
    }

    /// Tier points for a metric where larger values are better (depth, volume).
    pub fn score_higher_better(&self, value: f64) -> f64 {
        if value >= self.excellent {
            100.0
        } else if value >= self.good {
            80.0
        } else if value >= self.fair {
            60.0
        } else if value >= self.poor {
            40.0
        } else {
            20.0
        }
    }
}

/// Score a market's tradability and grade it A-F.
pub fn score_market_quality(input: &MarketQualityInput, config: &QualityConfig) -> MarketQualityResult {
    let components = QualityComponents {
        spread: config.spread.score_lower_better(input.spread),
        depth: config.depth.score_higher_better(input.depth),
        volume: config.volume.score_higher_better(input.volume_24h),
        staleness: config.staleness.score_lower_better(input.staleness_hours),
        clarity: clamp_unit(input.resolution_clarity) * 100.0,
    };

    let w = &config.weights;
    let score = clamp_score(
        components.spread * w.spread
            + components.depth * w.depth
            + components.volume * w.volume
            + components.staleness * w.staleness
            + components.clarity * w.clarity,
    );
    let grade = QualityGrade::from_score(score);

    let candidates = vec![
        (
            (components.spread - NEUTRAL_SUB_SCORE) * w.spread,
            WhyBullet::new(
                format!("Spread of {:.3} scores {:.0}/100", input.spread, components.spread),
                "spread",
                input.spread,
            )
            .with_comparison(format!("excellent at or below {}", config.spread.excellent)),
        ),
        (
            (components.depth - NEUTRAL_SUB_SCORE) * w.depth,
            WhyBullet::new(
                format!("${:.0} of book depth scores {:.0}/100", input.depth, components.depth),
                "depth",
                input.depth,
            )
            .with_unit("USD")
            .with_comparison(format!("excellent at or above ${:.0}", config.depth.excellent)),
        ),
        (
            (components.volume - NEUTRAL_SUB_SCORE) * w.volume,
            WhyBullet::new(
                format!("${:.0} traded in 24h scores {:.0}/100", input.volume_24h, components.volume),
                "volume_24h",
                input.volume_24h,
            )
            .with_unit("USD")
            .with_comparison(format!("excellent at or above ${:.0}", config.volume.excellent)),
        ),
        (
            (components.staleness - NEUTRAL_SUB_SCORE) * w.staleness,
            WhyBullet::new(
                format!(
                    "Last update {:.1}h ago scores {:.0}/100",
                    input.staleness_hours, components.staleness
                ),
                "staleness",
                input.staleness_hours,
            )
            .with_unit("hours")
            .with_comparison(format!("excellent within {}h", config.staleness.excellent)),
        ),
        (
            (components.clarity - NEUTRAL_SUB_SCORE) * w.clarity,
            WhyBullet::new(
                format!("Resolution clarity {:.0}%", components.clarity),
                "resolution_clarity",
                round2(components.clarity),
            )
            .with_unit("%"),
        ),
    ];

    let why_bullets = pad_or_trim(
        top_by_magnitude(candidates),
        &WhyBullet::filler("No further quality signals"),
    );

    tracing::debug!(score = score, grade = ?grade, "Scored market quality");

    MarketQualityResult {
        score,
        grade,
        components,
        why_bullets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(spread: f64, depth: f64, volume: f64, staleness: f64, clarity: f64) -> MarketQualityInput {
        MarketQualityInput {
            spread,
            depth,
            volume_24h: volume,
            staleness_hours: staleness,
            resolution_clarity: clarity,
        }
    }

    #[test]
    fn test_excellent_market_grades_a() {
        let result = score_market_quality(
            &input(0.005, 100_000.0, 500_000.0, 0.5, 1.0),
            &QualityConfig::default(),
        );
        assert!((result.score - 100.0).abs() < 1e-9);
        assert_eq!(result.grade, QualityGrade::A);
    }

    #[test]
    fn test_poor_market_grades_f() {
        let result = score_market_quality(
            &input(0.25, 200.0, 50.0, 200.0, 0.1),
            &QualityConfig::default(),
        );
        // 20 on every tiered component plus 10 clarity
        assert!((result.score - (20.0 * 0.85 + 10.0 * 0.15)).abs() < 1e-9);
        assert_eq!(result.grade, QualityGrade::F);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(QualityGrade::from_score(90.0), QualityGrade::A);
        assert_eq!(QualityGrade::from_score(89.9), QualityGrade::B);
        assert_eq!(QualityGrade::from_score(75.0), QualityGrade::B);
        assert_eq!(QualityGrade::from_score(60.0), QualityGrade::C);
        assert_eq!(QualityGrade::from_score(40.0), QualityGrade::D);
        assert_eq!(QualityGrade::from_score(39.9), QualityGrade::F);
    }

    #[test]
    fn test_grade_monotonic_in_each_input() {
        let config = QualityConfig::default();
        let base = input(0.03, 8_000.0, 8_000.0, 12.0, 0.5);
        let base_score = score_market_quality(&base, &config).score;

        let spreads = [0.2, 0.08, 0.04, 0.015, 0.005];
        let mut last = 0.0;
        for spread in spreads {
            let score = score_market_quality(&MarketQualityInput { spread, ..base.clone() }, &config).score;
            assert!(score >= last, "score must not drop as spread tightens");
            last = score;
        }

        let depths = [100.0, 2_000.0, 6_000.0, 30_000.0, 80_000.0];
        let mut last = 0.0;
        for depth in depths {
            let score = score_market_quality(&MarketQualityInput { depth, ..base.clone() }, &config).score;
            assert!(score >= last, "score must not drop as depth grows");
            last = score;
        }

        let stale = [100.0, 48.0, 12.0, 3.0, 0.5];
        let mut last = 0.0;
        for staleness_hours in stale {
            let score = score_market_quality(
                &MarketQualityInput { staleness_hours, ..base.clone() },
                &config,
            )
            .score;
            assert!(score >= last, "score must not drop as data gets fresher");
            last = score;
        }

        let clearer = score_market_quality(
            &MarketQualityInput { resolution_clarity: 0.9, ..base.clone() },
            &config,
        );
        assert!(clearer.score >= base_score);
    }

    #[test]
    fn test_bullets_lead_with_biggest_drag() {
        // Everything excellent except a very wide spread
        let result = score_market_quality(
            &input(0.3, 100_000.0, 500_000.0, 0.5, 1.0),
            &QualityConfig::default(),
        );
        assert_eq!(result.why_bullets[0].metric, "spread");
        assert!(result.why_bullets.iter().all(|b| b.value.is_finite()));
    }
}
