//! Order flow episodes
//!
//! Groups a market's trade stream into sessions ("episodes") separated by quiet
//! gaps, then labels each episode's behavioral signature.
//!
//! Prices inside an episode are YES-implied and net flow is measured in YES
//! terms, so a market traded on both outcome tokens reads consistently.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FlowConfig;
use crate::models::{clamp_score, clamp_unit, round2, TradeEvent};
use crate::why::{pad_or_trim, WhyBullet, WhyBullets};

/// A contiguous burst of trading in one market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEpisode {
    pub market_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub trade_count: usize,
    pub total_volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    /// Buy minus sell volume in YES terms
    pub net_flow: f64,
    pub unique_wallets: usize,
    pub avg_trade_size: f64,
    /// Average trade size over the first half of the episode
    pub early_avg_size: f64,
    /// Average trade size over the second half of the episode
    pub late_avg_size: f64,
    pub price_at_start: f64,
    pub price_at_end: f64,
}

impl FlowEpisode {
    fn from_trades(market_id: &str, trades: &[&TradeEvent]) -> Option<Self> {
        let first = trades.first()?;
        let last = trades.last()?;

        let mut buy_volume = 0.0;
        let mut sell_volume = 0.0;
        let mut wallets = HashSet::new();
        for trade in trades {
            let flow = trade.yes_flow();
            if flow >= 0.0 {
                buy_volume += flow;
            } else {
                sell_volume += -flow;
            }
            wallets.insert(trade.wallet_id.as_str());
        }

        let total_volume = buy_volume + sell_volume;
        let count = trades.len();
        let half = count / 2;
        let (early, late) = trades.split_at(half.max(1).min(count));

        Some(Self {
            market_id: market_id.to_string(),
            start_time: first.timestamp,
            end_time: last.timestamp,
            trade_count: count,
            total_volume,
            buy_volume,
            sell_volume,
            net_flow: buy_volume - sell_volume,
            unique_wallets: wallets.len(),
            avg_trade_size: total_volume / count as f64,
            early_avg_size: average_size(early),
            late_avg_size: average_size(late),
            price_at_start: first.yes_price(),
            price_at_end: last.yes_price(),
        })
    }

    /// Percentage price change from the first to the last trade
    pub fn price_impact(&self) -> f64 {
        if self.price_at_start > 0.0 {
            (self.price_at_end - self.price_at_start) / self.price_at_start * 100.0
        } else {
            0.0
        }
    }

    /// |net flow| / total volume, 0-1
    pub fn directional_bias(&self) -> f64 {
        if self.total_volume > 0.0 {
            self.net_flow.abs() / self.total_volume
        } else {
            0.0
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 60.0
    }
}

fn average_size(trades: &[&TradeEvent]) -> f64 {
    if trades.is_empty() {
        0.0
    } else {
        trades.iter().map(|t| t.size).sum::<f64>() / trades.len() as f64
    }
}

/// Split a market's trades into episodes.
///
/// Trades for other markets are ignored. Input order does not matter; trades
/// are re-sorted by timestamp (stable, so equal timestamps keep their order).
pub fn build_flow_episodes(market_id: &str, trades: &[TradeEvent], config: &FlowConfig) -> Vec<FlowEpisode> {
    let mut sorted: Vec<&TradeEvent> = trades.iter().filter(|t| t.market_id == market_id).collect();
    sorted.sort_by_key(|t| t.timestamp);

    let gap = Duration::minutes(config.session_gap_minutes);
    let mut sessions: Vec<Vec<&TradeEvent>> = Vec::new();

    for trade in sorted {
        let continues = sessions
            .last()
            .and_then(|s| s.last())
            .map(|prev| trade.timestamp - prev.timestamp <= gap)
            .unwrap_or(false);

        match sessions.last_mut() {
            Some(current) if continues => current.push(trade),
            _ => sessions.push(vec![trade]),
        }
    }

    let episodes: Vec<FlowEpisode> = sessions
        .iter()
        .filter(|s| s.len() >= config.min_trades_for_episode)
        .filter_map(|s| FlowEpisode::from_trades(market_id, s))
        .collect();

    tracing::debug!(
        market_id = %market_id,
        sessions = sessions.len(),
        episodes = episodes.len(),
        "Built flow episodes"
    );

    episodes
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowLabel {
    OneOffSpike,
    SustainedAccumulation,
    CrowdChase,
    ExhaustionMove,
}

impl FlowLabel {
    const ALL: [FlowLabel; 4] = [
        FlowLabel::OneOffSpike,
        FlowLabel::SustainedAccumulation,
        FlowLabel::CrowdChase,
        FlowLabel::ExhaustionMove,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Self::OneOffSpike => "one-off spikes",
            Self::SustainedAccumulation => "sustained accumulation",
            Self::CrowdChase => "crowd chases",
            Self::ExhaustionMove => "exhaustion moves",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowLabelResult {
    pub market_id: String,
    pub episode_start: DateTime<Utc>,
    pub episode_end: DateTime<Utc>,
    pub label: FlowLabel,
    /// 0-100
    pub confidence: f64,
    /// Whether the label's conditions were fully met rather than best-effort
    pub triggered: bool,
    /// % change start to end
    pub price_impact: f64,
    pub net_flow: f64,
    pub total_volume: f64,
    #[serde(default)]
    pub follow_up_price_change: Option<f64>,
    /// Did price keep moving with the flow afterwards
    #[serde(default)]
    pub predictive: Option<bool>,
    pub why_bullets: WhyBullets,
}

/// Output of one pattern detector
struct Detection {
    label: FlowLabel,
    triggered: bool,
    strength: f64,
    bullets: Vec<WhyBullet>,
}

fn detect_spike(episode: &FlowEpisode, config: &FlowConfig) -> Detection {
    let size_ratio = episode.avg_trade_size / config.spike_min_size;
    let few_trades = episode.trade_count <= config.spike_max_trades;
    let count_factor = if few_trades {
        1.0
    } else {
        config.spike_max_trades as f64 / episode.trade_count as f64
    };

    Detection {
        label: FlowLabel::OneOffSpike,
        triggered: few_trades && episode.avg_trade_size >= config.spike_min_size,
        strength: clamp_unit(size_ratio) * count_factor,
        bullets: vec![
            WhyBullet::new(
                format!("Average trade of ${:.0}", episode.avg_trade_size),
                "avg_trade_size",
                episode.avg_trade_size,
            )
            .with_unit("USD")
            .with_comparison(format!("whale size at ${:.0}", config.spike_min_size)),
            WhyBullet::new(
                format!("Only {} trades in the episode", episode.trade_count),
                "trade_count",
                episode.trade_count as f64,
            )
            .with_comparison(format!("spikes have at most {}", config.spike_max_trades)),
            WhyBullet::new(
                format!("Price moved {:+.1}%", episode.price_impact()),
                "price_impact",
                episode.price_impact(),
            )
            .with_unit("%"),
        ],
    }
}

fn detect_accumulation(episode: &FlowEpisode, config: &FlowConfig) -> Detection {
    let bias = episode.directional_bias();
    let enough_trades = episode.trade_count >= config.accumulation_min_trades;
    let concentrated = episode.unique_wallets <= config.accumulation_max_wallets;

    let trade_factor = clamp_unit(episode.trade_count as f64 / config.accumulation_min_trades as f64);
    let wallet_factor = if concentrated {
        1.0
    } else {
        config.accumulation_max_wallets as f64 / episode.unique_wallets.max(1) as f64
    };
    let bias_factor = clamp_unit(bias / config.accumulation_min_bias);

    let direction = if episode.net_flow >= 0.0 { "buying" } else { "selling" };

    Detection {
        label: FlowLabel::SustainedAccumulation,
        triggered: enough_trades && concentrated && bias >= config.accumulation_min_bias,
        strength: (trade_factor + wallet_factor + bias_factor) / 3.0 * bias_factor.max(0.5),
        bullets: vec![
            WhyBullet::new(
                format!(
                    "{} trades from just {} wallet(s)",
                    episode.trade_count, episode.unique_wallets
                ),
                "unique_wallets",
                episode.unique_wallets as f64,
            )
            .with_comparison(format!("at most {}", config.accumulation_max_wallets)),
            WhyBullet::new(
                format!("{:.0}% one-sided {}", bias * 100.0, direction),
                "directional_bias",
                round2(bias * 100.0),
            )
            .with_unit("%")
            .with_comparison(format!("at least {:.0}%", config.accumulation_min_bias * 100.0)),
            WhyBullet::new(
                format!("Net flow of ${:.0} over {:.0} minutes", episode.net_flow, episode.duration_minutes()),
                "net_flow",
                episode.net_flow,
            )
            .with_unit("USD"),
        ],
    }
}

/// Crowd-chase and exhaustion share the crowd condition; exhaustion is the
/// late-stage variant at an extreme price with shrinking trade sizes.
fn detect_crowd(episode: &FlowEpisode, config: &FlowConfig) -> (Detection, Detection) {
    let price_move = episode.price_at_end - episode.price_at_start;
    let flow_sign = if episode.net_flow >= 0.0 { 1.0 } else { -1.0 };
    let move_with_flow = price_move * flow_sign;

    let crowded = episode.unique_wallets >= config.crowd_min_wallets;
    let chasing = move_with_flow >= config.crowd_min_price_move;
    let crowd_triggered = crowded && chasing;

    let wallet_factor = clamp_unit(episode.unique_wallets as f64 / config.crowd_min_wallets as f64);
    let move_factor = clamp_unit(move_with_flow / config.crowd_min_price_move);
    let crowd_strength = (wallet_factor + move_factor) / 2.0 * move_factor.max(0.25);

    let extreme_high = config.exhaustion_price_threshold;
    let extreme_low = 1.0 - config.exhaustion_price_threshold;
    // The extreme has to lie in the direction the crowd is pushing
    let at_extreme = if episode.net_flow > 0.0 {
        episode.price_at_end >= extreme_high
    } else if episode.net_flow < 0.0 {
        episode.price_at_end <= extreme_low
    } else {
        false
    };
    let shrinking = episode.late_avg_size < episode.early_avg_size;
    let size_decay = if episode.early_avg_size > 0.0 {
        1.0 - episode.late_avg_size / episode.early_avg_size
    } else {
        0.0
    };

    let crowd_bullets = vec![
        WhyBullet::new(
            format!("{} different wallets joined", episode.unique_wallets),
            "unique_wallets",
            episode.unique_wallets as f64,
        )
        .with_comparison(format!("crowd at {}", config.crowd_min_wallets)),
        WhyBullet::new(
            format!("Price moved {:+.3} with the flow", move_with_flow),
            "price_move_with_flow",
            move_with_flow,
        )
        .with_comparison(format!("at least {}", config.crowd_min_price_move)),
        WhyBullet::new(
            format!("Episode lasted {:.0} minutes", episode.duration_minutes()),
            "duration_minutes",
            episode.duration_minutes(),
        )
        .with_unit("minutes"),
    ];

    let exhaustion_bullets = vec![
        WhyBullet::new(
            format!("Ended at an extreme price of {:.2}", episode.price_at_end),
            "price_at_end",
            episode.price_at_end,
        )
        .with_comparison(if episode.net_flow < 0.0 {
            format!("extreme at {:.2} or lower", extreme_low)
        } else {
            format!("extreme at {:.2} or higher", extreme_high)
        }),
        WhyBullet::new(
            format!(
                "Trade sizes shrank from ${:.0} to ${:.0}",
                episode.early_avg_size, episode.late_avg_size
            ),
            "size_decay",
            round2(size_decay * 100.0),
        )
        .with_unit("%"),
        WhyBullet::new(
            format!("{} wallets piled in", episode.unique_wallets),
            "unique_wallets",
            episode.unique_wallets as f64,
        ),
    ];

    let exhaustion_strength =
        crowd_strength * if at_extreme { 1.0 } else { 0.5 } * if shrinking { 1.0 } else { 0.5 };

    (
        Detection {
            label: FlowLabel::ExhaustionMove,
            triggered: crowd_triggered && at_extreme && shrinking,
            strength: exhaustion_strength,
            bullets: exhaustion_bullets,
        },
        Detection {
            label: FlowLabel::CrowdChase,
            triggered: crowd_triggered,
            strength: crowd_strength,
            bullets: crowd_bullets,
        },
    )
}

/// Label one episode.
///
/// `follow_up_price_change` is the YES price change some window after the
/// episode. It does not affect the label; it only fills `predictive`.
pub fn classify_flow_episode(
    episode: &FlowEpisode,
    follow_up_price_change: Option<f64>,
    config: &FlowConfig,
) -> FlowLabelResult {
    let (exhaustion, crowd) = detect_crowd(episode, config);
    let detections = [
        detect_spike(episode, config),
        detect_accumulation(episode, config),
        exhaustion,
        crowd,
    ];

    // Priority order: first triggered detector wins, otherwise the strongest
    // partial signal (first on ties).
    let chosen = detections.iter().find(|d| d.triggered).unwrap_or_else(|| {
        detections
            .iter()
            .fold(&detections[0], |best, d| if d.strength > best.strength { d } else { best })
    });

    let strength = clamp_unit(chosen.strength);
    let confidence = if chosen.triggered {
        clamp_score(50.0 + 45.0 * strength)
    } else {
        clamp_score(15.0 + 25.0 * strength)
    };

    // Balanced flow has no direction to confirm
    let predictive = follow_up_price_change.map(|change| {
        episode.net_flow != 0.0 && change != 0.0 && change.signum() == episode.net_flow.signum()
    });

    tracing::debug!(
        market_id = %episode.market_id,
        label = ?chosen.label,
        triggered = chosen.triggered,
        confidence = confidence,
        "Classified flow episode"
    );

    FlowLabelResult {
        market_id: episode.market_id.clone(),
        episode_start: episode.start_time,
        episode_end: episode.end_time,
        label: chosen.label,
        confidence,
        triggered: chosen.triggered,
        price_impact: episode.price_impact(),
        net_flow: episode.net_flow,
        total_volume: episode.total_volume,
        follow_up_price_change,
        predictive,
        why_bullets: pad_or_trim(
            chosen.bullets.clone(),
            &WhyBullet::filler("No further flow signals"),
        ),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Buying,
    Selling,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFlowSummary {
    pub market_id: String,
    pub episodes_considered: usize,
    #[serde(default)]
    pub dominant_flow_type: Option<FlowLabel>,
    pub net_direction: FlowDirection,
    pub net_flow_usd: f64,
    pub total_volume_usd: f64,
    /// 0-100
    pub intensity_score: f64,
    pub why_bullets: WhyBullets,
}

/// Roll the most recent classified episodes of a market into one summary.
pub fn summarize_market_flow(
    market_id: &str,
    results: &[FlowLabelResult],
    config: &FlowConfig,
) -> MarketFlowSummary {
    let mut recent: Vec<&FlowLabelResult> = results.iter().filter(|r| r.market_id == market_id).collect();
    recent.sort_by(|a, b| b.episode_end.cmp(&a.episode_end));
    recent.truncate(config.summary_max_episodes);

    let count = recent.len();
    let net_flow_usd: f64 = recent.iter().map(|r| r.net_flow).sum();
    let total_volume_usd: f64 = recent.iter().map(|r| r.total_volume).sum();
    let avg_confidence = if count > 0 {
        recent.iter().map(|r| r.confidence).sum::<f64>() / count as f64
    } else {
        0.0
    };

    let mut tallies: HashMap<FlowLabel, (usize, f64)> = HashMap::new();
    for result in &recent {
        let entry = tallies.entry(result.label).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += result.confidence;
    }
    let dominant = FlowLabel::ALL
        .iter()
        .filter_map(|label| tallies.get(label).map(|t| (*label, *t)))
        .fold(None::<(FlowLabel, (usize, f64))>, |best, candidate| match best {
            None => Some(candidate),
            Some(current) => {
                let (c_count, c_conf) = candidate.1;
                let (b_count, b_conf) = current.1;
                if c_count > b_count || (c_count == b_count && c_conf > b_conf) {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        });
    let dominant_flow_type = dominant.map(|(label, _)| label);
    let dominant_count = dominant.map(|(_, (n, _))| n).unwrap_or(0);

    let net_direction = if net_flow_usd > 0.0 {
        FlowDirection::Buying
    } else if net_flow_usd < 0.0 {
        FlowDirection::Selling
    } else {
        FlowDirection::Neutral
    };

    let intensity_score = if count == 0 {
        0.0
    } else {
        clamp_score(
            count as f64 / config.summary_max_episodes.max(1) as f64 * 40.0
                + (total_volume_usd / 100_000.0).min(1.0) * 40.0
                + avg_confidence * 0.2,
        )
    };

    let direction_text = match net_direction {
        FlowDirection::Buying => "Net buying",
        FlowDirection::Selling => "Net selling",
        FlowDirection::Neutral => "Balanced flow",
    };

    let bullets = match dominant_flow_type {
        None => Vec::new(),
        Some(label) => vec![
            WhyBullet::new(
                format!(
                    "{} of the last {} episodes were {}",
                    dominant_count,
                    count,
                    label.description()
                ),
                "dominant_episode_count",
                dominant_count as f64,
            ),
            WhyBullet::new(
                format!("{} of ${:.0}", direction_text, net_flow_usd.abs()),
                "net_flow_usd",
                net_flow_usd,
            )
            .with_unit("USD"),
            WhyBullet::new(
                format!("${:.0} traded across recent episodes", total_volume_usd),
                "total_volume_usd",
                total_volume_usd,
            )
            .with_unit("USD"),
        ],
    };

    MarketFlowSummary {
        market_id: market_id.to_string(),
        episodes_considered: count,
        dominant_flow_type,
        net_direction,
        net_flow_usd,
        total_volume_usd,
        intensity_score,
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No recent flow episodes")),
    }
}
