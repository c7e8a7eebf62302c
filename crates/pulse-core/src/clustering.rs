//! Behavioral clustering of markets
//!
//! Nearest-centroid classification over five behavioral dimensions. The
//! centroids are analyst-defined constants, not fitted from data.

use serde::{Deserialize, Serialize};

use crate::models::round2;
use crate::why::{pad_or_trim, WhyBullet, WhyBullets};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BehaviorVector {
    pub volatility: f64,
    pub momentum: f64,
    pub liquidity_profile: f64,
    pub time_horizon: f64,
    pub event_sensitivity: f64,
}

impl BehaviorVector {
    const DIMENSION_NAMES: [&'static str; 5] = [
        "volatility",
        "momentum",
        "liquidity_profile",
        "time_horizon",
        "event_sensitivity",
    ];

    fn as_array(&self) -> [f64; 5] {
        [
            self.volatility,
            self.momentum,
            self.liquidity_profile,
            self.time_horizon,
            self.event_sensitivity,
        ]
    }

    pub fn distance(&self, other: &BehaviorVector) -> f64 {
        self.as_array()
            .iter()
            .zip(other.as_array().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorCluster {
    StableLiquid,
    VolatileSpeculative,
    TrendingMomentum,
    IlliquidNiche,
    EventBinary,
    LongHorizon,
}

impl BehaviorCluster {
    pub fn label(&self) -> &'static str {
        match self {
            Self::StableLiquid => "Stable & Liquid",
            Self::VolatileSpeculative => "Volatile Speculative",
            Self::TrendingMomentum => "Trending Momentum",
            Self::IlliquidNiche => "Illiquid Niche",
            Self::EventBinary => "Event Binary",
            Self::LongHorizon => "Long Horizon",
        }
    }
}

pub struct Centroid {
    pub cluster: BehaviorCluster,
    pub center: BehaviorVector,
}

const fn centroid(cluster: BehaviorCluster, v: [f64; 5]) -> Centroid {
    Centroid {
        cluster,
        center: BehaviorVector {
            volatility: v[0],
            momentum: v[1],
            liquidity_profile: v[2],
            time_horizon: v[3],
            event_sensitivity: v[4],
        },
    }
}

/// Centroid table. Order matters: it breaks distance ties.
pub static CENTROIDS: [Centroid; 6] = [
    centroid(BehaviorCluster::StableLiquid, [0.2, 0.3, 0.9, 0.5, 0.2]),
    centroid(BehaviorCluster::VolatileSpeculative, [0.9, 0.5, 0.4, 0.3, 0.6]),
    centroid(BehaviorCluster::TrendingMomentum, [0.5, 0.9, 0.6, 0.5, 0.4]),
    centroid(BehaviorCluster::IlliquidNiche, [0.4, 0.2, 0.1, 0.6, 0.3]),
    centroid(BehaviorCluster::EventBinary, [0.7, 0.4, 0.5, 0.2, 0.9]),
    centroid(BehaviorCluster::LongHorizon, [0.2, 0.3, 0.5, 0.9, 0.3]),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDistance {
    pub cluster: BehaviorCluster,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorClusterResult {
    pub cluster: BehaviorCluster,
    /// 1 - d1/(d1+d2), between 0.5 (tied) and 1.0 (on the centroid)
    pub confidence: f64,
    /// Distance to every centroid, in table order
    pub distances: Vec<ClusterDistance>,
    pub why_bullets: WhyBullets,
}

/// Assign a market to its nearest behavioral archetype.
pub fn classify_behavior(vector: &BehaviorVector) -> BehaviorClusterResult {
    let distances: Vec<ClusterDistance> = CENTROIDS
        .iter()
        .map(|c| ClusterDistance {
            cluster: c.cluster,
            distance: vector.distance(&c.center),
        })
        .collect();

    // Stable sort keeps table order on ties
    let mut ranked: Vec<&ClusterDistance> = distances.iter().collect();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let nearest = ranked[0];
    let runner_up = ranked[1];
    let d1 = nearest.distance;
    let d2 = runner_up.distance;

    let confidence = if d1 + d2 <= 0.0 {
        1.0
    } else {
        1.0 - d1 / (d1 + d2)
    };

    let values = vector.as_array();
    let (dim_index, dim_value) = values
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| (a.1 - 0.5).abs().total_cmp(&(b.1 - 0.5).abs()))
        .unwrap_or((0, 0.5));
    let dim_name = BehaviorVector::DIMENSION_NAMES[dim_index];

    let bullets = vec![
        WhyBullet::new(
            format!(
                "Closest to the {} profile at distance {:.3}",
                nearest.cluster.label(),
                d1
            ),
            "centroid_distance",
            d1,
        ),
        WhyBullet::new(
            format!(
                "{:.3} closer than the runner-up {}",
                d2 - d1,
                runner_up.cluster.label()
            ),
            "distance_margin",
            d2 - d1,
        )
        .with_comparison(format!("runner-up distance {:.3}", d2)),
        WhyBullet::new(
            format!(
                "Most distinctive trait: {} at {:.2}",
                dim_name.replace('_', " "),
                dim_value
            ),
            dim_name,
            round2(dim_value),
        )
        .with_comparison("neutral 0.50"),
    ];

    tracing::debug!(
        cluster = ?nearest.cluster,
        confidence = confidence,
        "Classified market behavior"
    );

    BehaviorClusterResult {
        cluster: nearest.cluster,
        confidence,
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No further behavior signals")),
        distances,
    }
}
