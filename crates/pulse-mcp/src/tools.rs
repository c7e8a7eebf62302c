use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pulse_core::best_bets::{compute_best_bet, rank_best_bets, BestBetMarket, ElitePosition};
use pulse_core::clustering::{classify_behavior, BehaviorVector};
use pulse_core::consistency::{
    check_consistency, detect_relation, MarketPairInput, RelationType,
};
use pulse_core::exposure::{analyze_hidden_exposure, is_exposure_dangerous, PositionInput};
use pulse_core::flow::{build_flow_episodes, classify_flow_episode, summarize_market_flow};
use pulse_core::market_state::{classify_market_state, HistoricalAverages, MarketFeaturesInput};
use pulse_core::quality::{score_market_quality, MarketQualityInput};
use pulse_core::trade_review::{review_trade, TradeContext, TradeInput};
use pulse_core::trader_score::{compute_trader_metrics, score_trader, ClosedTrade};
use pulse_core::{EngineConfig, TradeEvent};

use crate::error::{validate_non_negative, validate_price, McpError, Result};

// ============================================================================
// MCP Protocol Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent on notifications
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

// ============================================================================
// Tool Arguments
// ============================================================================

#[derive(Debug, Deserialize)]
struct MarketStateArgs {
    features: MarketFeaturesInput,
    #[serde(default)]
    history: Option<HistoricalAverages>,
}

#[derive(Debug, Deserialize)]
struct ReviewTradeArgs {
    trade: TradeInput,
    #[serde(default)]
    context: TradeContext,
}

#[derive(Debug, Deserialize)]
struct AnalyzeFlowArgs {
    market_id: String,
    trades: Vec<TradeEvent>,
    /// Follow-up YES price change per episode, oldest first
    #[serde(default)]
    follow_up_price_changes: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct HiddenExposureArgs {
    wallet_id: String,
    positions: Vec<PositionInput>,
}

#[derive(Debug, Deserialize)]
struct ConsistencyArgs {
    #[serde(flatten)]
    pair: MarketPairInput,
    /// Skip detection and check against this relation
    #[serde(default)]
    relation_type: Option<RelationType>,
}

#[derive(Debug, Deserialize)]
struct BestBetArgs {
    #[serde(default)]
    market: Option<BestBetMarket>,
    /// Rank several markets instead of scoring one
    #[serde(default)]
    markets: Vec<BestBetMarket>,
    positions: Vec<ElitePosition>,
    #[serde(default)]
    elite_scores: HashMap<String, f64>,
    #[serde(default)]
    now: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ScoreTraderArgs {
    wallet_id: String,
    trades: Vec<ClosedTrade>,
}

fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| McpError::InvalidParameter(e.to_string()))
}

// ============================================================================
// Tool Definitions
// ============================================================================

fn why_note() -> &'static str {
    "Every result carries exactly three why_bullets with numeric evidence."
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "score_market_quality".to_string(),
            description: format!(
                "Grade how tradable a market is (A-F) from spread, depth, 24h volume, staleness and resolution clarity. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "spread": { "type": "number", "description": "Bid-ask spread (0-1)" },
                    "depth": { "type": "number", "description": "Order book depth in USD" },
                    "volume_24h": { "type": "number", "description": "24h volume in USD" },
                    "staleness_hours": { "type": "number", "description": "Hours since the last update" },
                    "resolution_clarity": { "type": "number", "description": "Clarity of resolution criteria (0-1)" }
                },
                "required": ["spread", "depth", "volume_24h", "staleness_hours", "resolution_clarity"]
            }),
        },
        Tool {
            name: "classify_behavior".to_string(),
            description: format!(
                "Assign a market to its nearest behavioral archetype from a five-dimension profile. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "volatility": { "type": "number" },
                    "momentum": { "type": "number" },
                    "liquidity_profile": { "type": "number" },
                    "time_horizon": { "type": "number" },
                    "event_sensitivity": { "type": "number" }
                },
                "required": ["volatility", "momentum", "liquidity_profile", "time_horizon", "event_sensitivity"]
            }),
        },
        Tool {
            name: "classify_market_state".to_string(),
            description: format!(
                "Classify a market's microstructure as calm_liquid, thin_slippage, jumpy or event_driven. Missing features lower confidence. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "features": {
                        "type": "object",
                        "description": "market_id plus optional spread, depth, staleness (seconds), vol_proxy, impact_proxy, trade_count, volume_usd"
                    },
                    "history": {
                        "type": "object",
                        "description": "Optional averages: avg_spread, avg_depth, avg_volume_usd, avg_trade_count"
                    }
                },
                "required": ["features"]
            }),
        },
        Tool {
            name: "review_trade".to_string(),
            description: format!(
                "Score the process quality of a single trade (0-100). Chasing a move of more than 3% forces poor_timing. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "trade": {
                        "type": "object",
                        "description": "trade_id, wallet_id, market_id, side (buy/sell), notional, timestamp"
                    },
                    "context": {
                        "type": "object",
                        "description": "Optional spread_at_entry, depth_at_entry, price_change_5m, price_change_15m, market_state_at_entry, volume_ratio, user_median_spread"
                    }
                },
                "required": ["trade"]
            }),
        },
        Tool {
            name: "analyze_flow".to_string(),
            description: format!(
                "Split a market's trades into episodes, label each (one_off_spike, sustained_accumulation, crowd_chase, exhaustion_move) and summarize recent flow. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market_id": { "type": "string" },
                    "trades": {
                        "type": "array",
                        "description": "Trade events: trade_id, wallet_id, market_id, timestamp, side, outcome, size, price"
                    },
                    "follow_up_price_changes": {
                        "type": "array",
                        "description": "Optional YES price change after each episode, oldest first"
                    }
                },
                "required": ["market_id", "trades"]
            }),
        },
        Tool {
            name: "analyze_hidden_exposure".to_string(),
            description: format!(
                "Group a wallet's positions into thematic clusters and report concentration risk. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wallet_id": { "type": "string" },
                    "positions": {
                        "type": "array",
                        "description": "Positions: market_id, question, category, exposure (signed USD), outcome"
                    }
                },
                "required": ["wallet_id", "positions"]
            }),
        },
        Tool {
            name: "check_consistency".to_string(),
            description: format!(
                "Detect how two markets relate (inverse, calendar_variant, multi_outcome, correlated) and flag prices that disagree. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market_a": {
                        "type": "object",
                        "description": "market_id, question, yes_price, end_date, category"
                    },
                    "market_b": { "type": "object" },
                    "relation_type": {
                        "type": "string",
                        "enum": ["inverse", "calendar_variant", "multi_outcome", "correlated"],
                        "description": "Skip detection and check against this relation"
                    }
                },
                "required": ["market_a", "market_b"]
            }),
        },
        Tool {
            name: "compute_best_bet".to_string(),
            description: format!(
                "Turn elite-trader positioning in a market into a consensus recommendation, or rank several markets. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "object", "description": "market_id, question, yes_price, category" },
                    "markets": { "type": "array", "description": "Rank these markets instead of scoring one" },
                    "positions": {
                        "type": "array",
                        "description": "Elite positions: wallet_id, market_id, outcome, size, opened_at"
                    },
                    "elite_scores": { "type": "object", "description": "Wallet id to elite score" },
                    "now": { "type": "string", "description": "Reference time (RFC 3339), defaults to the current time" },
                    "limit": { "type": "integer", "description": "Max ranked results (default: 10)" }
                },
                "required": ["positions"]
            }),
        },
        Tool {
            name: "score_trader".to_string(),
            description: format!(
                "Compute performance metrics and the composite elite score for a wallet's closed trades. {}",
                why_note()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wallet_id": { "type": "string" },
                    "trades": {
                        "type": "array",
                        "description": "Closed trades: trade_id, wallet_id, market_id, opened_at, closed_at, size, pnl"
                    }
                },
                "required": ["wallet_id", "trades"]
            }),
        },
    ]
}

// ============================================================================
// Tool Business Logic
// ============================================================================

/// Classifier tools bound to one validated configuration
pub struct PulseTools {
    config: EngineConfig,
}

impl PulseTools {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Execute a tool by name
    pub fn execute(&self, name: &str, args: &Value) -> Result<Value> {
        match name {
            "score_market_quality" => {
                let input: MarketQualityInput = parse_args(args)?;
                validate_price("spread", input.spread)?;
                validate_non_negative("depth", input.depth)?;
                validate_non_negative("volume_24h", input.volume_24h)?;
                validate_non_negative("staleness_hours", input.staleness_hours)?;
                Ok(serde_json::to_value(score_market_quality(&input, &self.config.quality))?)
            }
            "classify_behavior" => {
                let vector: BehaviorVector = parse_args(args)?;
                Ok(serde_json::to_value(classify_behavior(&vector))?)
            }
            "classify_market_state" => {
                let args: MarketStateArgs = parse_args(args)?;
                let result =
                    classify_market_state(&args.features, &self.config.market_state, args.history.as_ref());
                Ok(serde_json::to_value(result)?)
            }
            "review_trade" => {
                let args: ReviewTradeArgs = parse_args(args)?;
                validate_non_negative("notional", args.trade.notional)?;
                let result = review_trade(&args.trade, &args.context, &self.config.trade_review);
                Ok(serde_json::to_value(result)?)
            }
            "analyze_flow" => self.analyze_flow(parse_args(args)?),
            "analyze_hidden_exposure" => {
                let args: HiddenExposureArgs = parse_args(args)?;
                let result = analyze_hidden_exposure(&args.wallet_id, &args.positions, &self.config.exposure);
                let risk = is_exposure_dangerous(&result, &self.config.exposure);
                Ok(json!({ "exposure": result, "risk": risk }))
            }
            "check_consistency" => self.check_consistency(parse_args(args)?),
            "compute_best_bet" => self.compute_best_bet(parse_args(args)?),
            "score_trader" => {
                let args: ScoreTraderArgs = parse_args(args)?;
                let metrics = compute_trader_metrics(&args.wallet_id, &args.trades);
                let score = score_trader(&metrics, &self.config.trader_score);
                Ok(json!({ "metrics": metrics, "score": score }))
            }
            _ => Err(McpError::UnknownTool(name.to_string())),
        }
    }

    fn analyze_flow(&self, args: AnalyzeFlowArgs) -> Result<Value> {
        for trade in &args.trades {
            validate_price("price", trade.price)?;
            validate_non_negative("size", trade.size)?;
        }

        let episodes = build_flow_episodes(&args.market_id, &args.trades, &self.config.flow);
        let results: Vec<_> = episodes
            .iter()
            .enumerate()
            .map(|(i, episode)| {
                let follow_up = args.follow_up_price_changes.get(i).copied().flatten();
                classify_flow_episode(episode, follow_up, &self.config.flow)
            })
            .collect();
        let summary = summarize_market_flow(&args.market_id, &results, &self.config.flow);

        Ok(json!({
            "market_id": args.market_id,
            "episodes": results,
            "summary": summary,
        }))
    }

    fn check_consistency(&self, args: ConsistencyArgs) -> Result<Value> {
        validate_price("market_a.yes_price", args.pair.market_a.yes_price)?;
        validate_price("market_b.yes_price", args.pair.market_b.yes_price)?;

        let config = &self.config.consistency;
        let relation = detect_relation(&args.pair, config);
        let relation_type = args
            .relation_type
            .or_else(|| relation.as_ref().map(|r| r.relation_type));
        let check = relation_type.map(|r| check_consistency(&args.pair, r, config));

        Ok(json!({
            "relation": relation,
            "check": check,
        }))
    }

    fn compute_best_bet(&self, args: BestBetArgs) -> Result<Value> {
        let now = args.now.unwrap_or_else(Utc::now);
        let config = &self.config.best_bets;

        if let Some(market) = &args.market {
            validate_price("market.yes_price", market.yes_price)?;
            let bet = compute_best_bet(market, &args.positions, &args.elite_scores, now, config);
            return Ok(json!({ "best_bet": bet }));
        }

        if args.markets.is_empty() {
            return Err(McpError::InvalidParameter(
                "Either market or markets is required".to_string(),
            ));
        }
        for market in &args.markets {
            validate_price("markets[].yes_price", market.yes_price)?;
        }
        let ranked = rank_best_bets(
            &args.markets,
            &args.positions,
            &args.elite_scores,
            now,
            args.limit.unwrap_or(10),
            config,
        );
        Ok(json!({ "best_bets": ranked }))
    }
}

// ============================================================================
// MCP Message Handlers
// ============================================================================

pub fn handle_initialize(_params: &Value) -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "pulse-mcp",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

pub fn handle_list_tools() -> Value {
    json!({
        "tools": get_tools()
    })
}

pub fn handle_call_tool(tools: &PulseTools, params: &Value) -> Value {
    let name = params["name"].as_str().unwrap_or("");
    let args = &params["arguments"];

    match tools.execute(name, args) {
        Ok(result) => {
            json!({
                "content": [{
                    "type": "text",
                    "text": serde_json::to_string_pretty(&result).unwrap_or_default()
                }]
            })
        }
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "Tool call failed");
            json!({
                "content": [{
                    "type": "text",
                    "text": format!("Error: {}", e)
                }],
                "isError": true
            })
        }
    }
}

pub fn handle_request(tools: &PulseTools, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let result = match request.method.as_str() {
        "initialize" => Some(handle_initialize(&request.params)),
        "initialized" => None, // Notification, no response needed
        "tools/list" => Some(handle_list_tools()),
        "tools/call" => Some(handle_call_tool(tools, &request.params)),
        "notifications/cancelled" => None, // Notification
        _ => {
            return Some(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(JsonRpcError {
                    code: -32601,
                    message: format!("Method not found: {}", request.method),
                }),
            });
        }
    };

    result.map(|r| JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: request.id,
        result: Some(r),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> PulseTools {
        PulseTools::new(EngineConfig::default())
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_tool_list_covers_every_classifier() {
        let names: Vec<String> = get_tools().into_iter().map(|t| t.name).collect();
        for expected in [
            "score_market_quality",
            "classify_behavior",
            "classify_market_state",
            "review_trade",
            "analyze_flow",
            "analyze_hidden_exposure",
            "check_consistency",
            "compute_best_bet",
            "score_trader",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {}", expected);
        }
    }

    #[test]
    fn test_unknown_method() {
        let response = handle_request(&tools(), request("resources/list", Value::Null)).unwrap();
        assert_eq!(response.error.map(|e| e.code), Some(-32601));
    }

    #[test]
    fn test_notifications_get_no_response() {
        assert!(handle_request(&tools(), request("initialized", Value::Null)).is_none());
        assert!(handle_request(&tools(), request("notifications/cancelled", Value::Null)).is_none());
    }

    #[test]
    fn test_unknown_tool_is_an_error_result() {
        let response = handle_request(
            &tools(),
            request("tools/call", json!({ "name": "nope", "arguments": {} })),
        )
        .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    #[test]
    fn test_score_market_quality_tool() {
        let value = tools()
            .execute(
                "score_market_quality",
                &json!({
                    "spread": 0.005,
                    "depth": 100000.0,
                    "volume_24h": 500000.0,
                    "staleness_hours": 0.5,
                    "resolution_clarity": 1.0
                }),
            )
            .unwrap();
        assert_eq!(value["grade"], json!("A"));
        assert_eq!(value["why_bullets"].as_array().map(|b| b.len()), Some(3));
    }

    #[test]
    fn test_invalid_arguments_are_rejected() {
        let err = tools()
            .execute("score_market_quality", &json!({ "spread": 0.01 }))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameter(_)));

        let err = tools()
            .execute(
                "score_market_quality",
                &json!({
                    "spread": 3.0,
                    "depth": 1.0,
                    "volume_24h": 1.0,
                    "staleness_hours": 1.0,
                    "resolution_clarity": 1.0
                }),
            )
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameter(_)));
    }

    #[test]
    fn test_trade_review_override_through_tool() {
        let value = tools()
            .execute(
                "review_trade",
                &json!({
                    "trade": {
                        "trade_id": "t1",
                        "wallet_id": "w1",
                        "market_id": "m1",
                        "side": "buy",
                        "notional": 250.0,
                        "timestamp": "2024-06-01T12:00:00Z"
                    },
                    "context": { "price_change_15m": 0.10 }
                }),
            )
            .unwrap();
        assert_eq!(value["label"], json!("poor_timing"));
    }

    #[test]
    fn test_check_consistency_tool_with_explicit_relation() {
        let value = tools()
            .execute(
                "check_consistency",
                &json!({
                    "market_a": { "market_id": "a", "question": "Will X win?", "yes_price": 0.6 },
                    "market_b": { "market_id": "b", "question": "Will X lose?", "yes_price": 0.6 },
                    "relation_type": "inverse"
                }),
            )
            .unwrap();
        assert_eq!(value["check"]["relation_type"], json!("inverse"));
        assert!(value["check"]["score"].as_f64().unwrap() < 80.0);
    }

    #[test]
    fn test_check_consistency_tool_detects_antonym_inverse() {
        let value = tools()
            .execute(
                "check_consistency",
                &json!({
                    "market_a": { "market_id": "a", "question": "Will Team A win the final?", "yes_price": 0.55 },
                    "market_b": { "market_id": "b", "question": "Will Team A lose the final?", "yes_price": 0.52 }
                }),
            )
            .unwrap();
        assert_eq!(value["relation"]["relation_type"], json!("inverse"));
        assert_eq!(value["check"]["relation_type"], json!("inverse"));
        assert_eq!(value["check"]["label"], json!("potential_inconsistency_low"));
    }

    #[test]
    fn test_empty_exposure_tool() {
        let value = tools()
            .execute("analyze_hidden_exposure", &json!({ "wallet_id": "w1", "positions": [] }))
            .unwrap();
        assert_eq!(value["exposure"]["diversification_score"], json!(100.0));
        assert_eq!(value["risk"]["level"], json!("ok"));
    }

    #[test]
    fn test_best_bet_requires_a_market() {
        let err = tools()
            .execute("compute_best_bet", &json!({ "positions": [] }))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameter(_)));
    }
}
