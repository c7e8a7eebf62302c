//! Properties every classifier must hold: exactly three finite why-bullets and
//! identical output for identical input.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use pulse_core::best_bets::{compute_best_bet, BestBetMarket, ElitePosition};
use pulse_core::clustering::{classify_behavior, BehaviorVector};
use pulse_core::consistency::{check_consistency, MarketInput, MarketPairInput, RelationType};
use pulse_core::exposure::{analyze_hidden_exposure, PositionInput};
use pulse_core::flow::{build_flow_episodes, classify_flow_episode, summarize_market_flow};
use pulse_core::market_state::{classify_market_state, MarketFeaturesInput};
use pulse_core::quality::{score_market_quality, MarketQualityInput};
use pulse_core::trade_review::{review_trade, TradeContext, TradeInput};
use pulse_core::trader_score::{compute_trader_metrics, score_trader, ClosedTrade};
use pulse_core::{EngineConfig, Outcome, Side, TradeEvent, WhyBullets};
use serde::Serialize;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn assert_bullets(name: &str, bullets: &WhyBullets) {
    assert_eq!(bullets.len(), 3, "{} must carry three bullets", name);
    for bullet in bullets {
        assert!(bullet.value.is_finite(), "{} produced a non-finite bullet: {:?}", name, bullet);
        assert!(!bullet.text.is_empty(), "{} produced an empty bullet", name);
    }
}

fn assert_idempotent<T: Serialize>(name: &str, first: &T, second: &T) {
    let a = serde_json::to_value(first).unwrap();
    let b = serde_json::to_value(second).unwrap();
    assert_eq!(a, b, "{} is not deterministic", name);
}

fn trades() -> Vec<TradeEvent> {
    [(120, "w1", 12_000.0), (115, "w1", 15_000.0), (50, "w2", 300.0), (45, "w3", 200.0)]
        .iter()
        .enumerate()
        .map(|(i, (minutes_ago, wallet, size))| TradeEvent {
            trade_id: format!("t{}", i),
            wallet_id: wallet.to_string(),
            market_id: "m1".to_string(),
            timestamp: now() - Duration::minutes(*minutes_ago),
            side: Side::Buy,
            outcome: if i % 2 == 0 { Outcome::Yes } else { Outcome::No },
            size: *size,
            price: 0.4 + i as f64 * 0.05,
        })
        .collect()
}

#[test]
fn test_quality_invariants() {
    let config = EngineConfig::default();
    let input = MarketQualityInput {
        spread: 0.0,
        depth: 0.0,
        volume_24h: 0.0,
        staleness_hours: 0.0,
        resolution_clarity: 0.0,
    };
    let first = score_market_quality(&input, &config.quality);
    let second = score_market_quality(&input, &config.quality);

    assert_bullets("quality", &first.why_bullets);
    assert!((0.0..=100.0).contains(&first.score));
    assert_idempotent("quality", &first, &second);
}

#[test]
fn test_behavior_invariants() {
    let vector = BehaviorVector {
        volatility: 0.0,
        momentum: 0.0,
        liquidity_profile: 0.0,
        time_horizon: 0.0,
        event_sensitivity: 0.0,
    };
    let first = classify_behavior(&vector);
    assert_bullets("behavior", &first.why_bullets);
    assert_idempotent("behavior", &first, &classify_behavior(&vector));
}

#[test]
fn test_market_state_with_no_features() {
    let config = EngineConfig::default();
    let features = MarketFeaturesInput {
        market_id: "m1".to_string(),
        ..Default::default()
    };
    let first = classify_market_state(&features, &config.market_state, None);

    assert_bullets("market_state", &first.why_bullets);
    assert!(first.confidence > 0.0);
    assert_idempotent(
        "market_state",
        &first,
        &classify_market_state(&features, &config.market_state, None),
    );
}

#[test]
fn test_trade_review_invariants() {
    let config = EngineConfig::default();
    let trade = TradeInput {
        trade_id: "t1".to_string(),
        wallet_id: "w1".to_string(),
        market_id: "m1".to_string(),
        side: Side::Buy,
        notional: 500.0,
        timestamp: now(),
    };
    let context = TradeContext {
        price_change_15m: Some(0.10),
        spread_at_entry: Some(0.005),
        depth_at_entry: Some(100_000.0),
        ..Default::default()
    };
    let first = review_trade(&trade, &context, &config.trade_review);

    assert_bullets("trade_review", &first.why_bullets);
    assert_idempotent(
        "trade_review",
        &first,
        &review_trade(&trade, &context, &config.trade_review),
    );
}

#[test]
fn test_flow_invariants() {
    let config = EngineConfig::default();
    let trades = trades();
    let episodes = build_flow_episodes("m1", &trades, &config.flow);
    assert_eq!(episodes.iter().map(|e| e.trade_count).collect::<Vec<_>>(), vec![2, 2]);

    let results: Vec<_> = episodes
        .iter()
        .map(|e| classify_flow_episode(e, Some(0.01), &config.flow))
        .collect();
    for result in &results {
        assert_bullets("flow_episode", &result.why_bullets);
        assert!((0.0..=100.0).contains(&result.confidence));
    }

    let summary = summarize_market_flow("m1", &results, &config.flow);
    assert_bullets("flow_summary", &summary.why_bullets);
    assert_idempotent(
        "flow_summary",
        &summary,
        &summarize_market_flow("m1", &results, &config.flow),
    );
    assert_bullets(
        "empty_flow_summary",
        &summarize_market_flow("m1", &[], &config.flow).why_bullets,
    );
}

#[test]
fn test_exposure_invariants() {
    let config = EngineConfig::default();
    let positions = vec![
        PositionInput {
            market_id: "m1".to_string(),
            question: "Will the Senate flip?".to_string(),
            category: Some("Politics".to_string()),
            exposure: 9_000.0,
            outcome: Outcome::Yes,
        },
        PositionInput {
            market_id: "m2".to_string(),
            question: "Will turnout top 60%?".to_string(),
            category: Some("Politics".to_string()),
            exposure: 1_000.0,
            outcome: Outcome::No,
        },
    ];

    let first = analyze_hidden_exposure("w1", &positions, &config.exposure);
    assert_bullets("exposure", &first.why_bullets);
    for cluster in &first.clusters {
        assert_bullets("exposure_cluster", &cluster.why_bullets);
    }
    assert_idempotent(
        "exposure",
        &first,
        &analyze_hidden_exposure("w1", &positions, &config.exposure),
    );

    let empty = analyze_hidden_exposure("w1", &[], &config.exposure);
    assert_bullets("empty_exposure", &empty.why_bullets);
    assert_eq!(empty.diversification_score, 100.0);
}

#[test]
fn test_consistency_invariants() {
    let config = EngineConfig::default();
    let pair = MarketPairInput {
        market_a: MarketInput {
            market_id: "a".to_string(),
            question: "Will X happen?".to_string(),
            yes_price: 0.6,
            end_date: None,
            category: None,
        },
        market_b: MarketInput {
            market_id: "b".to_string(),
            question: "Will X not happen?".to_string(),
            yes_price: 0.6,
            end_date: None,
            category: None,
        },
    };

    for relation in [
        RelationType::Inverse,
        RelationType::CalendarVariant,
        RelationType::MultiOutcome,
        RelationType::Correlated,
    ] {
        let first = check_consistency(&pair, relation, &config.consistency);
        assert_bullets("consistency", &first.why_bullets);
        assert!((0.0..=100.0).contains(&first.score));
        assert_idempotent(
            "consistency",
            &first,
            &check_consistency(&pair, relation, &config.consistency),
        );
    }
}

#[test]
fn test_best_bet_invariants() {
    let config = EngineConfig::default();
    let market = BestBetMarket {
        market_id: "m1".to_string(),
        question: "Will X happen?".to_string(),
        yes_price: 1.0,
        category: None,
    };
    let positions = vec![ElitePosition {
        wallet_id: "w1".to_string(),
        market_id: "m1".to_string(),
        outcome: Outcome::Yes,
        size: 0.0,
        opened_at: now(),
    }];

    let first = compute_best_bet(&market, &positions, &HashMap::new(), now(), &config.best_bets);
    let bet = first.clone().unwrap();
    assert_bullets("best_bet", &bet.why_bullets);
    assert_eq!(bet.potential_return_pct, None);
    assert_idempotent(
        "best_bet",
        &first,
        &compute_best_bet(&market, &positions, &HashMap::new(), now(), &config.best_bets),
    );
}

#[test]
fn test_trader_score_invariants() {
    let config = EngineConfig::default();
    let trades = vec![ClosedTrade {
        trade_id: "t1".to_string(),
        wallet_id: "w1".to_string(),
        market_id: "m1".to_string(),
        opened_at: now() - Duration::hours(3),
        closed_at: now(),
        size: 0.0,
        pnl: -10.0,
    }];

    let metrics = compute_trader_metrics("w1", &trades);
    let first = score_trader(&metrics, &config.trader_score);
    assert_bullets("trader_score", &first.why_bullets);
    assert_idempotent(
        "trader_score",
        &first,
        &score_trader(&compute_trader_metrics("w1", &trades), &config.trader_score),
    );

    let empty = score_trader(&compute_trader_metrics("w1", &[]), &config.trader_score);
    assert_bullets("empty_trader_score", &empty.why_bullets);
}
