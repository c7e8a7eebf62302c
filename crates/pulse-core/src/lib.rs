//! # Pulse Core
//!
//! Explainable signal classifiers for prediction market analytics.
//!
//! Every classifier in this crate is a pure function: the caller assembles the
//! inputs (market snapshots, trades, positions), the classifier returns a closed
//! label, a score and exactly three [`WhyBullet`]s carrying numeric evidence.
//! Nothing here touches storage, the network or the clock.

pub mod best_bets;
pub mod clustering;
pub mod config;
pub mod consistency;
pub mod error;
pub mod exposure;
pub mod flow;
pub mod market_state;
pub mod models;
pub mod quality;
pub mod trade_review;
pub mod trader_score;
pub mod why;

pub use config::EngineConfig;
pub use error::*;
pub use models::*;
pub use why::*;
