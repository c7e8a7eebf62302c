//! Hidden exposure analysis
//!
//! Positions that look unrelated often ride on the same underlying theme. This
//! module buckets a wallet's positions into thematic clusters and measures how
//! concentrated the portfolio really is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ExposureConfig;
use crate::models::{clamp_score, round2, Outcome};
use crate::why::{pad_or_trim, WhyBullet, WhyBullets};

/// Cluster id for positions with neither a keyword match nor a category
pub const OTHER_CLUSTER_ID: &str = "other";
const OTHER_CLUSTER_LABEL: &str = "Other Markets";

/// One open position in a wallet's portfolio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInput {
    pub market_id: String,
    pub question: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Signed USD exposure
    pub exposure: f64,
    pub outcome: Outcome,
}

/// A theme and the words that identify it
#[derive(Debug)]
pub struct ThemeCluster {
    pub id: &'static str,
    pub label: &'static str,
    pub keywords: &'static [&'static str],
}

/// Theme table, checked in order. The first theme with a matching keyword wins.
pub static CATEGORY_CLUSTERS: [ThemeCluster; 8] = [
    ThemeCluster {
        id: "us_politics",
        label: "US Politics",
        keywords: &[
            "trump", "biden", "harris", "election", "president", "presidential", "senate",
            "congress", "house", "republican", "democrat", "gop", "governor", "politics",
        ],
    },
    ThemeCluster {
        id: "fed_rates",
        label: "Fed & Interest Rates",
        keywords: &[
            "fed", "fomc", "powell", "interest rate", "rate cut", "rate hike", "inflation",
            "cpi", "recession",
        ],
    },
    ThemeCluster {
        id: "crypto",
        label: "Crypto",
        keywords: &[
            "bitcoin", "btc", "ethereum", "eth", "solana", "crypto", "etf", "stablecoin",
        ],
    },
    ThemeCluster {
        id: "geopolitics",
        label: "Geopolitics",
        keywords: &[
            "ukraine", "russia", "israel", "gaza", "iran", "china", "taiwan", "nato", "war",
            "ceasefire", "invasion",
        ],
    },
    ThemeCluster {
        id: "ai_tech",
        label: "AI & Tech",
        keywords: &["ai", "openai", "gpt", "nvidia", "agi", "chatgpt", "anthropic", "apple", "tesla"],
    },
    ThemeCluster {
        id: "sports",
        label: "Sports",
        keywords: &[
            "nba", "nfl", "mlb", "nhl", "super bowl", "world cup", "champions league",
            "premier league", "olympics", "sports",
        ],
    },
    ThemeCluster {
        id: "entertainment",
        label: "Entertainment",
        keywords: &["oscar", "oscars", "grammy", "box office", "album", "movie", "netflix"],
    },
    ThemeCluster {
        id: "climate",
        label: "Climate & Weather",
        keywords: &["climate", "temperature", "hurricane", "weather", "emissions"],
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureClusterResult {
    pub cluster_id: String,
    pub label: String,
    /// Sum of absolute exposure of the members
    pub exposure_usd: f64,
    /// Signed sum of the members
    pub net_exposure_usd: f64,
    /// Share of the portfolio's absolute exposure (0-100)
    pub exposure_pct: f64,
    pub market_count: usize,
    pub market_ids: Vec<String>,
    pub confidence: f64,
    pub why_bullets: WhyBullets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenExposureResult {
    pub wallet_id: String,
    pub total_exposure: f64,
    pub clusters: Vec<ExposureClusterResult>,
    /// HHI over every assigned cluster, scaled to 0-100
    pub concentration_risk: f64,
    pub diversification_score: f64,
    /// Share of the largest cluster, including clusters too small to report
    pub top_cluster_exposure: f64,
    #[serde(default)]
    pub top_cluster_label: Option<String>,
    pub why_bullets: WhyBullets,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExposureRiskLevel {
    Ok,
    Warning,
    Dangerous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureRisk {
    pub level: ExposureRiskLevel,
    #[serde(default)]
    pub warning: Option<String>,
}

impl ExposureRisk {
    pub fn is_dangerous(&self) -> bool {
        self.level == ExposureRiskLevel::Dangerous
    }
}

/// Lowercase and collapse to space-separated words, padded so that
/// `" keyword "` only matches whole words.
fn normalize_words(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    format!(" {} ", words.join(" "))
}

/// Resolve the cluster for one position: theme keyword, then category, then
/// the catch-all bucket.
pub fn assign_cluster(position: &PositionInput) -> (String, String) {
    let haystack = normalize_words(&format!(
        "{} {}",
        position.question,
        position.category.as_deref().unwrap_or("")
    ));

    let theme = CATEGORY_CLUSTERS.iter().find(|theme| {
        theme
            .keywords
            .iter()
            .any(|kw| haystack.contains(&format!(" {} ", kw)))
    });
    if let Some(theme) = theme {
        return (theme.id.to_string(), theme.label.to_string());
    }

    match position.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => {
            (format!("category:{}", category.to_lowercase()), category.to_string())
        }
        _ => (OTHER_CLUSTER_ID.to_string(), OTHER_CLUSTER_LABEL.to_string()),
    }
}

#[derive(Default)]
struct ClusterAccumulator<'a> {
    label: String,
    gross: f64,
    net: f64,
    members: Vec<&'a PositionInput>,
}

/// Group a wallet's positions into themes and measure concentration.
pub fn analyze_hidden_exposure(
    wallet_id: &str,
    positions: &[PositionInput],
    config: &ExposureConfig,
) -> HiddenExposureResult {
    let total_exposure: f64 = positions.iter().map(|p| p.exposure.abs()).sum();

    if positions.is_empty() || total_exposure <= 0.0 {
        return HiddenExposureResult {
            wallet_id: wallet_id.to_string(),
            total_exposure: 0.0,
            clusters: Vec::new(),
            concentration_risk: 0.0,
            diversification_score: 100.0,
            top_cluster_exposure: 0.0,
            top_cluster_label: None,
            why_bullets: pad_or_trim(Vec::new(), &WhyBullet::filler("No open exposure")),
        };
    }

    // BTreeMap keeps cluster iteration deterministic
    let mut grouped: BTreeMap<String, ClusterAccumulator> = BTreeMap::new();
    for position in positions {
        let (id, label) = assign_cluster(position);
        let entry = grouped.entry(id).or_default();
        entry.label = label;
        entry.gross += position.exposure.abs();
        entry.net += position.exposure;
        entry.members.push(position);
    }

    let concentration_risk = clamp_score(
        grouped
            .values()
            .map(|c| (c.gross / total_exposure).powi(2))
            .sum::<f64>()
            * 100.0,
    );
    let diversification_score = 100.0 - concentration_risk;

    let (top_id, top_cluster) = grouped
        .iter()
        .fold(None::<(&String, &ClusterAccumulator)>, |best, (id, c)| match best {
            Some((_, b)) if b.gross >= c.gross => best,
            _ => Some((id, c)),
        })
        .map(|(id, c)| (Some(id.clone()), Some(c)))
        .unwrap_or((None, None));
    let top_cluster_exposure = top_cluster
        .map(|c| c.gross / total_exposure * 100.0)
        .unwrap_or(0.0);
    let top_cluster_label = top_cluster.map(|c| c.label.clone());

    let mut clusters: Vec<ExposureClusterResult> = grouped
        .iter()
        .filter(|(_, c)| c.members.len() >= config.min_markets_for_cluster)
        .map(|(id, c)| build_cluster(id, c, total_exposure))
        .collect();
    clusters.sort_by(|a, b| {
        b.exposure_pct
            .total_cmp(&a.exposure_pct)
            .then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });
    clusters.truncate(config.max_cluster_count);

    let bullets = vec![
        WhyBullet::new(
            format!(
                "${:.0} of exposure across {} positions",
                total_exposure,
                positions.len()
            ),
            "total_exposure",
            total_exposure,
        )
        .with_unit("USD"),
        WhyBullet::new(
            format!("Concentration index of {:.0}/100", concentration_risk),
            "concentration_risk",
            round2(concentration_risk),
        )
        .with_comparison(format!("{} clusters in total", grouped.len())),
        WhyBullet::new(
            format!(
                "{:.0}% sits in {}",
                top_cluster_exposure,
                top_cluster_label.as_deref().unwrap_or(OTHER_CLUSTER_LABEL)
            ),
            "top_cluster_exposure",
            round2(top_cluster_exposure),
        )
        .with_unit("%"),
    ];

    tracing::debug!(
        wallet_id = %wallet_id,
        positions = positions.len(),
        clusters = grouped.len(),
        top_cluster = ?top_id,
        concentration_risk = concentration_risk,
        "Analyzed hidden exposure"
    );

    HiddenExposureResult {
        wallet_id: wallet_id.to_string(),
        total_exposure,
        clusters,
        concentration_risk,
        diversification_score,
        top_cluster_exposure,
        top_cluster_label,
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No further exposure signals")),
    }
}

fn build_cluster(id: &str, cluster: &ClusterAccumulator, total_exposure: f64) -> ExposureClusterResult {
    let exposure_pct = cluster.gross / total_exposure * 100.0;
    let market_count = cluster.members.len();

    let largest = cluster
        .members
        .iter()
        .fold(None::<&PositionInput>, |best, p| match best {
            Some(b) if b.exposure.abs() >= p.exposure.abs() => Some(b),
            _ => Some(p),
        });
    let largest_share = match largest {
        Some(p) if cluster.gross > 0.0 => p.exposure.abs() / cluster.gross * 100.0,
        _ => 0.0,
    };

    let bullets = vec![
        WhyBullet::new(
            format!("{:.0}% of the portfolio is {}", exposure_pct, cluster.label),
            "exposure_pct",
            round2(exposure_pct),
        )
        .with_unit("%"),
        WhyBullet::new(
            format!("{} markets share this theme", market_count),
            "market_count",
            market_count as f64,
        ),
        WhyBullet::new(
            format!(
                "Largest position {} is {:.0}% of the cluster",
                largest.map(|p| p.market_id.as_str()).unwrap_or("-"),
                largest_share
            ),
            "top_market_share",
            round2(largest_share),
        )
        .with_unit("%"),
    ];

    ExposureClusterResult {
        cluster_id: id.to_string(),
        label: cluster.label.clone(),
        exposure_usd: cluster.gross,
        net_exposure_usd: cluster.net,
        exposure_pct,
        market_count,
        market_ids: cluster.members.iter().map(|p| p.market_id.clone()).collect(),
        confidence: (60.0 + 5.0 * market_count as f64).min(100.0),
        why_bullets: pad_or_trim(bullets, &WhyBullet::filler("No further cluster signals")),
    }
}

/// Flag portfolios whose largest theme dominates.
pub fn is_exposure_dangerous(result: &HiddenExposureResult, config: &ExposureConfig) -> ExposureRisk {
    let label = result.top_cluster_label.as_deref().unwrap_or(OTHER_CLUSTER_LABEL);
    let share = result.top_cluster_exposure;

    if share > config.concentration_danger {
        ExposureRisk {
            level: ExposureRiskLevel::Dangerous,
            warning: Some(format!(
                "{:.0}% of exposure is concentrated in {}; a single outcome there moves the whole portfolio",
                share, label
            )),
        }
    } else if share > config.concentration_warning {
        ExposureRisk {
            level: ExposureRiskLevel::Warning,
            warning: Some(format!(
                "{:.0}% of exposure sits in {}; consider diversifying",
                share, label
            )),
        }
    } else {
        ExposureRisk {
            level: ExposureRiskLevel::Ok,
            warning: None,
        }
    }
}
