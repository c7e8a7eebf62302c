//! Best-bets recommendations
//!
//! Aggregates the open positions of elite wallets in a market into a consensus
//! view, then scores how much that consensus is worth following.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BestBetsConfig;
use crate::models::{clamp_score, round2, Outcome};
use crate::why::{pad_or_trim, WhyBullet, WhyBullets};

/// An open position held by a tracked wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElitePosition {
    pub wallet_id: String,
    pub market_id: String,
    pub outcome: Outcome,
    /// USD size
    pub size: f64,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestBetMarket {
    pub market_id: String,
    pub question: String,
    /// Current YES price (0-1)
    pub yes_price: f64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusDirection {
    Bullish,
    Bearish,
    Mixed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedSide {
    Yes,
    No,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTrend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTrader {
    pub wallet_id: String,
    pub outcome: Outcome,
    pub size: f64,
    pub elite_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestBet {
    pub market_id: String,
    pub question: String,
    pub consensus_direction: ConsensusDirection,
    /// Share of elite volume on the bigger side (50-100)
    pub consensus_strength: f64,
    pub recommended_side: RecommendedSide,
    /// 0-100
    pub confidence_score: f64,
    pub tier: RecommendationTier,
    pub risk_level: RiskLevel,
    pub activity_trend: ActivityTrend,
    pub elite_trader_count: usize,
    pub avg_elite_score: f64,
    pub yes_volume: f64,
    pub no_volume: f64,
    /// Return if the recommended side resolves in its favor
    #[serde(default)]
    pub potential_return_pct: Option<f64>,
    pub top_traders: Vec<TopTrader>,
    pub last_activity: DateTime<Utc>,
    pub why_bullets: WhyBullets,
}

/// Weight for how recent the newest elite position is
fn recency_factor(age: Duration) -> f64 {
    let hours = age.num_seconds().max(0) as f64 / 3600.0;
    if hours <= 1.0 {
        1.0
    } else if hours <= 6.0 {
        0.8
    } else if hours <= 24.0 {
        0.6
    } else if hours <= 72.0 {
        0.3
    } else {
        0.1
    }
}

fn activity_trend(positions: &[&ElitePosition], now: DateTime<Utc>) -> ActivityTrend {
    let day_ago = now - Duration::hours(24);
    let two_days_ago = now - Duration::hours(48);

    let recent = positions.iter().filter(|p| p.opened_at > day_ago).count() as f64;
    let prior = positions
        .iter()
        .filter(|p| p.opened_at > two_days_ago && p.opened_at <= day_ago)
        .count() as f64;

    if recent > prior * 1.2 {
        ActivityTrend::Increasing
    } else if recent < prior * 0.8 {
        ActivityTrend::Decreasing
    } else {
        ActivityTrend::Stable
    }
}

/// Build a recommendation for one market from the elite positions in it.
///
/// Positions for other markets are ignored. Returns `None` when no elite
/// wallet holds the market.
pub fn compute_best_bet(
    market: &BestBetMarket,
    positions: &[ElitePosition],
    elite_scores: &HashMap<String, f64>,
    now: DateTime<Utc>,
    config: &BestBetsConfig,
) -> Option<BestBet> {
    let positions: Vec<&ElitePosition> = positions
        .iter()
        .filter(|p| p.market_id == market.market_id)
        .collect();
    let last_activity = positions.iter().map(|p| p.opened_at).max()?;

    let yes_volume: f64 = positions
        .iter()
        .filter(|p| p.outcome == Outcome::Yes)
        .map(|p| p.size)
        .sum();
    let no_volume: f64 = positions
        .iter()
        .filter(|p| p.outcome == Outcome::No)
        .map(|p| p.size)
        .sum();
    let total_volume = yes_volume + no_volume;

    let consensus_strength = if total_volume > 0.0 {
        yes_volume.max(no_volume) / total_volume * 100.0
    } else {
        50.0
    };
    let yes_leads = yes_volume >= no_volume;

    let strong_consensus = consensus_strength >= config.consensus_threshold;
    let (consensus_direction, recommended_side) = match (strong_consensus, yes_leads) {
        (true, true) => (ConsensusDirection::Bullish, RecommendedSide::Yes),
        (true, false) => (ConsensusDirection::Bearish, RecommendedSide::No),
        (false, _) => (ConsensusDirection::Mixed, RecommendedSide::None),
    };

    let score_of = |wallet: &str| {
        elite_scores
            .get(wallet)
            .copied()
            .unwrap_or(config.neutral_elite_score)
    };

    let wallets: HashSet<&str> = positions.iter().map(|p| p.wallet_id.as_str()).collect();
    let elite_trader_count = wallets.len();
    let avg_elite_score = wallets.iter().map(|w| score_of(*w)).sum::<f64>() / elite_trader_count as f64;

    let recency = recency_factor(now - last_activity);
    let count_factor = (elite_trader_count as f64 / config.full_trader_count.max(1) as f64).min(1.0);

    let confidence_score = clamp_score(
        count_factor * 25.0
            + avg_elite_score / 100.0 * 30.0
            + (consensus_strength - 50.0) / 50.0 * 30.0
            + recency * 15.0,
    );

    let tier = if confidence_score >= config.strong_score {
        RecommendationTier::Strong
    } else if confidence_score >= config.moderate_score {
        RecommendationTier::Moderate
    } else {
        RecommendationTier::Weak
    };

    let risk_level = if consensus_strength >= config.low_risk_consensus
        && elite_trader_count >= config.low_risk_min_traders
    {
        RiskLevel::Low
    } else if consensus_strength >= config.consensus_threshold
        && elite_trader_count >= config.medium_risk_min_traders
    {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };

    let side_price = match recommended_side {
        RecommendedSide::Yes => Some(market.yes_price),
        RecommendedSide::No => Some(1.0 - market.yes_price),
        RecommendedSide::None => None,
    };
    let potential_return_pct = side_price
        .filter(|p| *p > 0.0 && *p < 1.0)
        .map(|p| (1.0 / p - 1.0) * 100.0);

    let mut by_size = positions.clone();
    by_size.sort_by(|a, b| b.size.total_cmp(&a.size).then_with(|| a.wallet_id.cmp(&b.wallet_id)));
    let top_traders = by_size
        .iter()
        .take(config.max_top_traders)
        .map(|p| TopTrader {
            wallet_id: p.wallet_id.clone(),
            outcome: p.outcome,
            size: p.size,
            elite_score: score_of(p.wallet_id.as_str()),
        })
        .collect();

    let leading_side = if yes_leads { "YES" } else { "NO" };
    let minutes_since = (now - last_activity).num_minutes().max(0);
    let bullets = vec![
        WhyBullet::new(
            format!(
                "{:.0}% of elite volume is on {}",
                consensus_strength, leading_side
            ),
            "consensus_strength",
            round2(consensus_strength),
        )
        .with_unit("%")
        .with_comparison(format!("consensus at {:.0}%", config.consensus_threshold)),
        WhyBullet::new(
            format!(
                "{} elite wallets with an average score of {:.0}",
                elite_trader_count, avg_elite_score
            ),
            "elite_trader_count",
            elite_trader_count as f64,
        ),
        WhyBullet::new(
            format!("Latest elite entry {} minutes ago", minutes_since),
            "minutes_since_last_entry",
            minutes_since as f64,
        )
        .with_unit("minutes"),
    ];

    tracing::debug!(
        market_id = %market.market_id,
        traders = elite_trader_count,
        consensus_strength = consensus_strength,
        score = confidence_score,
        side = ?recommended_side,
        "Computed best bet"
    );

    Some(BestBet {
        market_id: market.market_id.clone(),
        question: market.question.clone(),
        consensus_direction,
        consensus_strength,
        recommended_side,
        confidence_score,
        tier,
        risk_level,
        activity_trend: activity_trend(&positions, now),
        elite_trader_count,
        avg_elite_score,
        yes_volume,
        no_volume,
        potential_return_pct,
        top_traders,
        last_activity,
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No further consensus signals")),
    })
}

/// Compute best bets for many markets and return the top `limit` by score.
pub fn rank_best_bets(
    markets: &[BestBetMarket],
    positions: &[ElitePosition],
    elite_scores: &HashMap<String, f64>,
    now: DateTime<Utc>,
    limit: usize,
    config: &BestBetsConfig,
) -> Vec<BestBet> {
    let mut bets: Vec<BestBet> = markets
        .iter()
        .filter_map(|m| compute_best_bet(m, positions, elite_scores, now, config))
        .collect();

    bets.sort_by(|a, b| {
        b.confidence_score
            .total_cmp(&a.confidence_score)
            .then_with(|| a.market_id.cmp(&b.market_id))
    });
    bets.truncate(limit);
    bets
}
