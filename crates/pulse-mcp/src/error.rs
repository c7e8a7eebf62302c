use pulse_core::PulseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] PulseError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

pub type Result<T> = std::result::Result<T, McpError>;

/// Validate that a price is a probability
pub fn validate_price(field: &str, price: f64) -> Result<()> {
    if !price.is_finite() || !(0.0..=1.0).contains(&price) {
        return Err(McpError::InvalidParameter(format!(
            "{} must be between 0 and 1, got {}",
            field, price
        )));
    }
    Ok(())
}

/// Validate that a size or amount is usable
pub fn validate_non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(McpError::InvalidParameter(format!(
            "{} must be a non-negative number, got {}",
            field, value
        )));
    }
    Ok(())
}
