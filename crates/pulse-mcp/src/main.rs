//! Market Pulse MCP Server
//!
//! Exposes the pulse-core signal classifiers to AI agents as MCP tools.
//! Implements the MCP protocol using pure JSON-RPC over stdio.

mod config;
mod error;
mod tools;

use std::io::{self, BufRead, Write};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;
use crate::tools::{handle_request, JsonRpcRequest, PulseTools};

fn main() -> anyhow::Result<()> {
    // Initialize logging to stderr (stdout is for MCP protocol)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulse_mcp=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Market Pulse MCP Server");

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    tracing::info!(
        session_gap_minutes = config.engine.flow.session_gap_minutes,
        similarity_threshold = config.engine.consistency.similarity_threshold,
        consensus_threshold = config.engine.best_bets.consensus_threshold,
        "Configuration loaded"
    );

    let tools = PulseTools::new(config.engine);

    tracing::info!("MCP server ready, listening on stdio");

    // Main loop: read JSON-RPC requests from stdin, write responses to stdout
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "Error reading stdin");
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Error parsing request");
                continue;
            }
        };

        tracing::debug!(method = %request.method, "Received request");

        // Only send response if one was produced (notifications don't get responses)
        if let Some(response) = handle_request(&tools, request) {
            let response_str = serde_json::to_string(&response).unwrap_or_default();
            if let Err(e) = writeln!(stdout, "{}", response_str) {
                tracing::error!(error = %e, "Error writing response");
            }
            if let Err(e) = stdout.flush() {
                tracing::error!(error = %e, "Error flushing stdout");
            }
        }
    }

    tracing::info!("MCP server shutting down");
    Ok(())
}
