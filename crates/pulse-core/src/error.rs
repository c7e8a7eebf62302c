//! Error types for Pulse Core
//!
//! Classifiers themselves are total and never fail. Errors only surface when
//! validating configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type PulseResult<T> = Result<T, PulseError>;
