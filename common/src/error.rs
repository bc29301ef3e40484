//! Error types shared across IndexSwap crates.

use thiserror::Error;

use crate::RatioKey;

/// Errors raised while building a [`RatioSet`](crate::RatioSet).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RatioSetError {
    /// A ratio was zero, negative, NaN or infinite.
    #[error("Invalid value {value} for {key}")]
    InvalidValue { key: RatioKey, value: f64 },
}
