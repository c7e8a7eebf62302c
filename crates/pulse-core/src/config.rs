//! Classifier thresholds
//!
//! Every classifier takes its own threshold struct. All structs deserialize with
//! `#[serde(default)]`, so a config file only has to name the values it changes.

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};

/// All classifier thresholds in one place
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub quality: QualityConfig,
    pub market_state: MarketStateConfig,
    pub trade_review: TradeReviewConfig,
    pub flow: FlowConfig,
    pub exposure: ExposureConfig,
    pub consistency: ConsistencyConfig,
    pub best_bets: BestBetsConfig,
    pub trader_score: TraderScoreConfig,
}

impl EngineConfig {
    /// Check that thresholds are ordered and positive where the classifiers
    /// rely on it. Called once at start-up by callers.
    pub fn validate(&self) -> PulseResult<()> {
        self.quality.spread.validate("quality.spread", TierDirection::LowerIsBetter)?;
        self.quality.depth.validate("quality.depth", TierDirection::HigherIsBetter)?;
        self.quality.volume.validate("quality.volume", TierDirection::HigherIsBetter)?;
        self.quality
            .staleness
            .validate("quality.staleness", TierDirection::LowerIsBetter)?;

        let weight_sum = self.quality.weights.sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(PulseError::InvalidConfig(format!(
                "quality.weights must sum to 1.0, got {:.4}",
                weight_sum
            )));
        }

        ordered("market_state.spread", self.market_state.spread_tight, self.market_state.spread_jumpy)?;
        ordered("market_state.depth", self.market_state.depth_low, self.market_state.depth_high)?;
        ordered("market_state.vol", self.market_state.vol_high, self.market_state.vol_event)?;

        ordered("trade_review.spread", self.trade_review.spread_good, self.trade_review.spread_bad)?;
        ordered("trade_review.depth", self.trade_review.depth_bad, self.trade_review.depth_good)?;
        ordered(
            "trade_review.price_change",
            self.trade_review.stable_threshold,
            self.trade_review.chase_threshold,
        )?;
        ordered(
            "trade_review.history_ratio",
            self.trade_review.history_better_ratio,
            self.trade_review.history_worse_ratio,
        )?;

        positive("flow.session_gap_minutes", self.flow.session_gap_minutes as f64)?;
        at_least_one("flow.min_trades_for_episode", self.flow.min_trades_for_episode)?;
        // Detector strengths divide by these
        positive("flow.spike_min_size", self.flow.spike_min_size)?;
        positive("flow.accumulation_min_bias", self.flow.accumulation_min_bias)?;
        positive("flow.crowd_min_price_move", self.flow.crowd_min_price_move)?;
        at_least_one("flow.accumulation_min_trades", self.flow.accumulation_min_trades)?;
        at_least_one("flow.crowd_min_wallets", self.flow.crowd_min_wallets)?;

        ordered(
            "exposure.concentration",
            self.exposure.concentration_warning,
            self.exposure.concentration_danger,
        )?;

        if !(0.0..=1.0).contains(&self.consistency.similarity_threshold) {
            return Err(PulseError::InvalidConfig(
                "consistency.similarity_threshold must be within 0-1".into(),
            ));
        }
        positive("consistency.inverted_divergence", self.consistency.inverted_divergence)?;
        positive("consistency.calendar_spread", self.consistency.calendar_spread)?;
        positive("consistency.multi_outcome_excess", self.consistency.multi_outcome_excess)?;
        positive("consistency.correlated_divergence", self.consistency.correlated_divergence)?;

        ordered("best_bets.tiers", self.best_bets.moderate_score, self.best_bets.strong_score)?;
        if self.best_bets.low_risk_consensus < self.best_bets.consensus_threshold
            || self.best_bets.low_risk_min_traders < self.best_bets.medium_risk_min_traders
        {
            return Err(PulseError::InvalidConfig(
                "best_bets: low risk cutoffs must be at least the medium ones".into(),
            ));
        }
        positive("trader_score.profit_target", self.trader_score.profit_target)?;
        ordered("trader_score.tiers", self.trader_score.moderate_score, self.trader_score.strong_score)?;
        ordered("trader_score.tiers", self.trader_score.strong_score, self.trader_score.elite_score)?;

        Ok(())
    }
}

fn ordered(name: &str, low: f64, high: f64) -> PulseResult<()> {
    if low < high {
        Ok(())
    } else {
        Err(PulseError::InvalidConfig(format!(
            "{}: expected {} < {}",
            name, low, high
        )))
    }
}

fn at_least_one(name: &str, value: usize) -> PulseResult<()> {
    if value >= 1 {
        Ok(())
    } else {
        Err(PulseError::InvalidConfig(format!("{} must be at least 1", name)))
    }
}

fn positive(name: &str, value: f64) -> PulseResult<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(PulseError::InvalidConfig(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

// =============================================================================
// Market Quality
// =============================================================================

/// Four-tier threshold table. A value at or better than a tier earns that tier's
/// points (100/80/60/40); anything worse than `poor` earns 20.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierTable {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierDirection {
    LowerIsBetter,
    HigherIsBetter,
}

impl TierTable {
    fn validate(&self, name: &str, direction: TierDirection) -> PulseResult<()> {
        let steps = [self.excellent, self.good, self.fair, self.poor];
        let monotonic = steps.windows(2).all(|w| match direction {
            TierDirection::LowerIsBetter => w[0] < w[1],
            TierDirection::HigherIsBetter => w[0] > w[1],
        });
        if monotonic {
            Ok(())
        } else {
            Err(PulseError::InvalidConfig(format!(
                "{} tiers are not monotonic: {:?}",
                name, steps
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityWeights {
    pub spread: f64,
    pub depth: f64,
    pub volume: f64,
    pub staleness: f64,
    pub clarity: f64,
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.spread + self.depth + self.volume + self.staleness + self.clarity
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            spread: 0.25,
            depth: 0.20,
            volume: 0.20,
            staleness: 0.20,
            clarity: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Bid-ask spread in price units (lower is better)
    pub spread: TierTable,
    /// Order book depth in USD (higher is better)
    pub depth: TierTable,
    /// 24h volume in USD (higher is better)
    pub volume: TierTable,
    /// Hours since last update (lower is better)
    pub staleness: TierTable,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            spread: TierTable { excellent: 0.01, good: 0.02, fair: 0.05, poor: 0.10 },
            depth: TierTable { excellent: 50_000.0, good: 20_000.0, fair: 5_000.0, poor: 1_000.0 },
            volume: TierTable { excellent: 100_000.0, good: 25_000.0, fair: 5_000.0, poor: 1_000.0 },
            staleness: TierTable { excellent: 1.0, good: 6.0, fair: 24.0, poor: 72.0 },
            weights: QualityWeights::default(),
        }
    }
}

// =============================================================================
// Market State
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketStateConfig {
    pub spread_tight: f64,
    pub spread_jumpy: f64,
    pub depth_low: f64,
    pub depth_high: f64,
    /// Seconds without an update before a book counts as stale
    pub staleness_high: f64,
    pub vol_high: f64,
    pub vol_event: f64,
    pub impact_high: f64,
    /// Volume / trade count multiple over the historical average that counts as a surge
    pub surge_multiple: f64,
}

impl Default for MarketStateConfig {
    fn default() -> Self {
        Self {
            spread_tight: 0.02,
            spread_jumpy: 0.05,
            depth_low: 1_000.0,
            depth_high: 10_000.0,
            staleness_high: 900.0,
            vol_high: 0.05,
            vol_event: 0.12,
            impact_high: 0.02,
            surge_multiple: 3.0,
        }
    }
}

// =============================================================================
// Trade Review
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeReviewConfig {
    pub spread_good: f64,
    pub spread_bad: f64,
    pub depth_good: f64,
    pub depth_bad: f64,
    /// Move in the trade direction over the lookback that counts as chasing
    pub chase_threshold: f64,
    /// Move below which the market counts as stable
    pub stable_threshold: f64,
    pub history_better_ratio: f64,
    pub history_worse_ratio: f64,
    pub volume_spike_ratio: f64,
}

impl Default for TradeReviewConfig {
    fn default() -> Self {
        Self {
            spread_good: 0.02,
            spread_bad: 0.05,
            depth_good: 10_000.0,
            depth_bad: 1_000.0,
            chase_threshold: 0.03,
            stable_threshold: 0.005,
            history_better_ratio: 0.8,
            history_worse_ratio: 1.2,
            volume_spike_ratio: 3.0,
        }
    }
}

// =============================================================================
// Flow
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub session_gap_minutes: i64,
    pub min_trades_for_episode: usize,
    pub spike_min_size: f64,
    pub spike_max_trades: usize,
    pub accumulation_min_trades: usize,
    pub accumulation_max_wallets: usize,
    pub accumulation_min_bias: f64,
    pub crowd_min_wallets: usize,
    pub crowd_min_price_move: f64,
    pub exhaustion_price_threshold: f64,
    /// Episodes considered by the market summary
    pub summary_max_episodes: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            session_gap_minutes: 30,
            min_trades_for_episode: 2,
            spike_min_size: 10_000.0,
            spike_max_trades: 3,
            accumulation_min_trades: 5,
            accumulation_max_wallets: 3,
            accumulation_min_bias: 0.7,
            crowd_min_wallets: 5,
            crowd_min_price_move: 0.02,
            exhaustion_price_threshold: 0.85,
            summary_max_episodes: 10,
        }
    }
}

// =============================================================================
// Hidden Exposure
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    pub min_markets_for_cluster: usize,
    pub max_cluster_count: usize,
    /// Top cluster share (%) above which diversification is suggested
    pub concentration_warning: f64,
    /// Top cluster share (%) above which the portfolio is flagged dangerous
    pub concentration_danger: f64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            min_markets_for_cluster: 2,
            max_cluster_count: 10,
            concentration_warning: 40.0,
            concentration_danger: 60.0,
        }
    }
}

// =============================================================================
// Consistency
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub similarity_threshold: f64,
    /// Max |pA + pB - 1| for a pair to be considered an inverse candidate
    pub inverse_sum_tolerance: f64,
    pub calendar_min_gap_days: f64,
    pub inverted_divergence: f64,
    pub calendar_spread: f64,
    pub multi_outcome_excess: f64,
    pub correlated_divergence: f64,
    /// Widening applied to the correlated threshold across categories
    pub cross_category_factor: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            inverse_sum_tolerance: 0.15,
            calendar_min_gap_days: 1.0,
            inverted_divergence: 0.05,
            calendar_spread: 0.05,
            multi_outcome_excess: 0.05,
            correlated_divergence: 0.20,
            cross_category_factor: 1.5,
        }
    }
}

// =============================================================================
// Best Bets
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BestBetsConfig {
    /// Consensus strength (%) needed to emit a side
    pub consensus_threshold: f64,
    pub strong_score: f64,
    pub moderate_score: f64,
    /// Trader count at which the count contribution saturates
    pub full_trader_count: usize,
    /// Elite score assumed for wallets without a score
    pub neutral_elite_score: f64,
    pub max_top_traders: usize,
    /// Consensus strength (%) needed for low risk
    pub low_risk_consensus: f64,
    pub low_risk_min_traders: usize,
    pub medium_risk_min_traders: usize,
}

impl Default for BestBetsConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 70.0,
            strong_score: 75.0,
            moderate_score: 50.0,
            full_trader_count: 10,
            neutral_elite_score: 50.0,
            max_top_traders: 5,
            low_risk_consensus: 80.0,
            low_risk_min_traders: 5,
            medium_risk_min_traders: 3,
        }
    }
}

// =============================================================================
// Trader Scoring
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderScoreConfig {
    /// Trades needed before the score is no longer scaled down
    pub min_trades: usize,
    /// Total profit (USD) that earns full profitability points
    pub profit_target: f64,
    pub elite_score: f64,
    pub strong_score: f64,
    pub moderate_score: f64,
}

impl Default for TraderScoreConfig {
    fn default() -> Self {
        Self {
            min_trades: 10,
            profit_target: 50_000.0,
            elite_score: 80.0,
            strong_score: 65.0,
            moderate_score: 45.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unordered_spread_tiers() {
        let mut config = EngineConfig::default();
        config.quality.spread.good = 0.001;
        assert!(matches!(config.validate(), Err(PulseError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_weights() {
        let mut config = EngineConfig::default();
        config.quality.weights.clarity = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_flow_divisors() {
        let mut config = EngineConfig::default();
        config.flow.spike_min_size = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.flow.crowd_min_price_move = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.flow.accumulation_min_bias = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.flow.crowd_min_wallets = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.flow.accumulation_min_trades = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_loose_low_risk_cutoffs() {
        let mut config = EngineConfig::default();
        config.best_bets.low_risk_min_traders = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "flow": { "session_gap_minutes": 45 } }"#).unwrap();
        assert_eq!(config.flow.session_gap_minutes, 45);
        assert_eq!(config.flow.min_trades_for_episode, 2);
        assert_eq!(config.exposure.max_cluster_count, 10);
    }
}
