//! Trader scoring
//!
//! Turns a wallet's closed-trade history into performance metrics and a single
//! composite score used to decide which wallets count as elite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TraderScoreConfig;
use crate::models::{clamp_score, clamp_unit, round2};
use crate::why::{pad_or_trim, top_by_magnitude, WhyBullet, WhyBullets};

/// Profit factor reported for wallets that never lost, and the ceiling for
/// everyone else.
pub const PROFIT_FACTOR_CAP: f64 = 10.0;

/// A round trip that has been closed out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub wallet_id: String,
    pub market_id: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// USD cost basis
    pub size: f64,
    /// Realized USD profit or loss
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraderMetrics {
    pub wallet_id: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// 0-1
    pub win_rate: f64,
    pub total_profit: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    /// Mean of pnl/size per trade
    pub avg_return: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough drop of cumulative PnL in USD
    pub max_drawdown: f64,
    /// Same drop as a percentage of the peak
    pub max_drawdown_pct: f64,
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
    /// Positive for a running win streak, negative for losses
    pub current_streak: i64,
    pub total_volume: f64,
    pub avg_hold_hours: f64,
    #[serde(default)]
    pub first_trade_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl TraderMetrics {
    /// Metrics for a wallet with no closed trades
    pub fn empty(wallet_id: &str) -> Self {
        Self {
            wallet_id: wallet_id.to_string(),
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_profit: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_factor: 0.0,
            avg_return: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            longest_win_streak: 0,
            longest_loss_streak: 0,
            current_streak: 0,
            total_volume: 0.0,
            avg_hold_hours: 0.0,
            first_trade_at: None,
            last_trade_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraderTier {
    Elite,
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraderScoreComponents {
    /// 0-25
    pub profitability: f64,
    /// 0-20
    pub win_rate: f64,
    /// 0-20
    pub profit_factor: f64,
    /// 0-20
    pub sharpe: f64,
    /// 0-15
    pub drawdown: f64,
}

impl TraderScoreComponents {
    pub fn total(&self) -> f64 {
        self.profitability + self.win_rate + self.profit_factor + self.sharpe + self.drawdown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderScore {
    pub wallet_id: String,
    /// 0-100 after experience scaling
    pub score: f64,
    pub tier: TraderTier,
    pub components: TraderScoreComponents,
    /// min(1, trades / min_trades)
    pub experience_factor: f64,
    pub why_bullets: WhyBullets,
}

fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Aggregate a wallet's closed trades into performance metrics.
///
/// Trades are processed in close-time order regardless of input order.
pub fn compute_trader_metrics(wallet_id: &str, trades: &[ClosedTrade]) -> TraderMetrics {
    if trades.is_empty() {
        return TraderMetrics::empty(wallet_id);
    }

    let mut sorted: Vec<&ClosedTrade> = trades.iter().collect();
    sorted.sort_by_key(|t| t.closed_at);

    let mut metrics = TraderMetrics::empty(wallet_id);
    metrics.total_trades = sorted.len();
    metrics.first_trade_at = sorted.iter().map(|t| t.opened_at).min();
    metrics.last_trade_at = sorted.last().map(|t| t.closed_at);

    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut win_run = 0usize;
    let mut loss_run = 0usize;
    let mut returns = Vec::with_capacity(sorted.len());
    let mut hold_hours = 0.0;

    for trade in &sorted {
        metrics.total_volume += trade.size;
        hold_hours += ((trade.closed_at - trade.opened_at).num_seconds().max(0) as f64) / 3600.0;
        returns.push(if trade.size > 0.0 { trade.pnl / trade.size } else { 0.0 });

        if trade.pnl > 0.0 {
            metrics.winning_trades += 1;
            metrics.gross_profit += trade.pnl;
            win_run += 1;
            loss_run = 0;
        } else if trade.pnl < 0.0 {
            metrics.losing_trades += 1;
            metrics.gross_loss += -trade.pnl;
            loss_run += 1;
            win_run = 0;
        } else {
            win_run = 0;
            loss_run = 0;
        }
        metrics.longest_win_streak = metrics.longest_win_streak.max(win_run);
        metrics.longest_loss_streak = metrics.longest_loss_streak.max(loss_run);

        equity += trade.pnl;
        peak = peak.max(equity);
        let drawdown = peak - equity;
        if drawdown > metrics.max_drawdown {
            metrics.max_drawdown = drawdown;
        }
        let drawdown_pct = if peak > 0.0 {
            drawdown / peak * 100.0
        } else if drawdown > 0.0 {
            100.0
        } else {
            0.0
        };
        metrics.max_drawdown_pct = metrics.max_drawdown_pct.max(drawdown_pct);
    }

    let n = metrics.total_trades as f64;
    metrics.current_streak = if win_run > 0 {
        win_run as i64
    } else {
        -(loss_run as i64)
    };
    metrics.win_rate = metrics.winning_trades as f64 / n;
    metrics.total_profit = metrics.gross_profit - metrics.gross_loss;
    metrics.profit_factor = if metrics.gross_loss > 0.0 {
        (metrics.gross_profit / metrics.gross_loss).min(PROFIT_FACTOR_CAP)
    } else if metrics.gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    };
    metrics.avg_return = returns.iter().sum::<f64>() / n;
    let std_dev = sample_std_dev(&returns, metrics.avg_return);
    metrics.sharpe_ratio = if std_dev > 0.0 {
        metrics.avg_return / std_dev
    } else {
        0.0
    };
    metrics.avg_hold_hours = hold_hours / n;

    tracing::debug!(
        wallet_id = %wallet_id,
        trades = metrics.total_trades,
        win_rate = metrics.win_rate,
        profit_factor = metrics.profit_factor,
        "Computed trader metrics"
    );

    metrics
}

/// Composite elite score for a wallet.
pub fn score_trader(metrics: &TraderMetrics, config: &TraderScoreConfig) -> TraderScore {
    let components = TraderScoreComponents {
        profitability: clamp_unit(metrics.total_profit / config.profit_target) * 25.0,
        win_rate: clamp_unit((metrics.win_rate - 0.4) / 0.3) * 20.0,
        profit_factor: clamp_unit((metrics.profit_factor - 1.0) / 2.0) * 20.0,
        sharpe: clamp_unit(metrics.sharpe_ratio / 1.0) * 20.0,
        drawdown: clamp_unit(1.0 - metrics.max_drawdown_pct / 50.0) * 15.0,
    };

    let experience_factor = (metrics.total_trades as f64 / config.min_trades.max(1) as f64).min(1.0);
    let score = clamp_score(components.total() * experience_factor);

    let tier = if score >= config.elite_score {
        TraderTier::Elite
    } else if score >= config.strong_score {
        TraderTier::Strong
    } else if score >= config.moderate_score {
        TraderTier::Moderate
    } else {
        TraderTier::Weak
    };

    // Rank evidence by distance from half marks
    let candidates = vec![
        (
            components.profitability - 12.5,
            WhyBullet::new(
                format!("${:.0} realized profit", metrics.total_profit),
                "total_profit",
                metrics.total_profit,
            )
            .with_unit("USD")
            .with_comparison(format!("full marks at ${:.0}", config.profit_target)),
        ),
        (
            components.win_rate - 10.0,
            WhyBullet::new(
                format!(
                    "Won {} of {} trades",
                    metrics.winning_trades, metrics.total_trades
                ),
                "win_rate",
                round2(metrics.win_rate * 100.0),
            )
            .with_unit("%")
            .with_comparison("full marks at 70%"),
        ),
        (
            components.profit_factor - 10.0,
            WhyBullet::new(
                format!("Profit factor of {:.2}", metrics.profit_factor),
                "profit_factor",
                round2(metrics.profit_factor),
            )
            .with_comparison("full marks at 3.0"),
        ),
        (
            components.sharpe - 10.0,
            WhyBullet::new(
                format!("Risk-adjusted return of {:.2}", metrics.sharpe_ratio),
                "sharpe_ratio",
                round2(metrics.sharpe_ratio),
            )
            .with_comparison("full marks at 1.0"),
        ),
        (
            components.drawdown - 7.5,
            WhyBullet::new(
                format!("Worst drawdown {:.0}% of peak", metrics.max_drawdown_pct),
                "max_drawdown_pct",
                round2(metrics.max_drawdown_pct),
            )
            .with_unit("%"),
        ),
    ];

    let mut bullets = if metrics.total_trades == 0 {
        Vec::new()
    } else {
        top_by_magnitude(candidates)
    };
    if experience_factor < 1.0 && metrics.total_trades > 0 {
        bullets.insert(
            0,
            WhyBullet::new(
                format!(
                    "Only {} closed trades, score scaled to {:.0}%",
                    metrics.total_trades,
                    experience_factor * 100.0
                ),
                "total_trades",
                metrics.total_trades as f64,
            )
            .with_comparison(format!("full weight at {} trades", config.min_trades)),
        );
    }

    tracing::debug!(
        wallet_id = %metrics.wallet_id,
        score = score,
        tier = ?tier,
        "Scored trader"
    );

    TraderScore {
        wallet_id: metrics.wallet_id.clone(),
        score,
        tier,
        components,
        experience_factor,
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No closed trades yet")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn closed(pnls: &[f64], size: f64) -> Vec<ClosedTrade> {
        pnls.iter()
            .enumerate()
            .map(|(i, pnl)| ClosedTrade {
                trade_id: format!("t{}", i),
                wallet_id: "w1".to_string(),
                market_id: format!("m{}", i),
                opened_at: start() + Duration::hours(i as i64 * 10),
                closed_at: start() + Duration::hours(i as i64 * 10 + 4),
                size,
                pnl: *pnl,
            })
            .collect()
    }

    #[test]
    fn test_empty_history_is_neutral() {
        let metrics = compute_trader_metrics("w1", &[]);
        assert_eq!(metrics, TraderMetrics::empty("w1"));

        let score = score_trader(&metrics, &TraderScoreConfig::default());
        assert_eq!(score.score, 0.0);
        assert_eq!(score.tier, TraderTier::Weak);
        assert!(score.why_bullets.iter().all(|b| b.metric == "none"));
    }

    #[test]
    fn test_metrics_for_mixed_history() {
        let metrics = compute_trader_metrics("w1", &closed(&[100.0, -50.0, 200.0, -50.0, 100.0], 1_000.0));

        assert_eq!(metrics.total_trades, 5);
        assert!((metrics.win_rate - 0.6).abs() < 1e-12);
        assert!((metrics.total_profit - 300.0).abs() < 1e-9);
        assert!((metrics.profit_factor - 4.0).abs() < 1e-9);
        assert!((metrics.max_drawdown - 50.0).abs() < 1e-9);
        assert!((metrics.max_drawdown_pct - 50.0).abs() < 1e-9);
        assert!((metrics.sharpe_ratio - 0.06 / 0.01175_f64.sqrt()).abs() < 1e-9);
        assert!((metrics.avg_hold_hours - 4.0).abs() < 1e-9);
        assert_eq!(metrics.current_streak, 1);
    }

    #[test]
    fn test_streaks() {
        let metrics = compute_trader_metrics("w1", &closed(&[10.0, 10.0, 10.0, -5.0, -5.0], 100.0));
        assert_eq!(metrics.longest_win_streak, 3);
        assert_eq!(metrics.longest_loss_streak, 2);
        assert_eq!(metrics.current_streak, -2);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut trades = closed(&[100.0, -50.0, 200.0], 1_000.0);
        let forward = compute_trader_metrics("w1", &trades);
        trades.reverse();
        assert_eq!(compute_trader_metrics("w1", &trades), forward);
    }

    #[test]
    fn test_profit_factor_cap_without_losses() {
        let metrics = compute_trader_metrics("w1", &closed(&[10.0, 20.0], 100.0));
        assert_eq!(metrics.profit_factor, PROFIT_FACTOR_CAP);
    }

    #[test]
    fn test_consistent_winner_is_elite() {
        let pnls: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 5_000.0 } else { 3_000.0 }).collect();
        let metrics = compute_trader_metrics("w1", &closed(&pnls, 10_000.0));
        let score = score_trader(&metrics, &TraderScoreConfig::default());

        assert!((score.score - 100.0).abs() < 1e-9);
        assert_eq!(score.tier, TraderTier::Elite);
        assert_eq!(score.experience_factor, 1.0);
    }

    #[test]
    fn test_short_history_is_scaled_down() {
        let metrics = compute_trader_metrics("w1", &closed(&[100.0, -50.0, 200.0, -50.0, 100.0], 1_000.0));
        let score = score_trader(&metrics, &TraderScoreConfig::default());

        assert!((score.experience_factor - 0.5).abs() < 1e-12);
        assert!((score.score - score.components.total() * 0.5).abs() < 1e-9);
        assert_eq!(score.tier, TraderTier::Weak);
        assert_eq!(score.why_bullets[0].metric, "total_trades");
    }
}
