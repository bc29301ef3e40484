//! Ratio subsystem error types.

use indexswap_common::RatioSetError;
use thiserror::Error;

/// Errors that can occur while fetching, caching or applying ratios.
///
/// Variants carry strings rather than source errors so a single refresh
/// outcome can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RatioError {
    /// Transport failure reaching the ratio source.
    #[error("Ratio fetch failed: {0}")]
    Fetch(String),

    /// Expected markers or numeric patterns missing from the source page.
    #[error("Ratio parse failed: {0}")]
    Parse(String),

    /// Parsed ratio was outside the valid range.
    #[error("Invalid ratio: {0}")]
    InvalidRatio(#[from] RatioSetError),

    /// Conversion type not recognised.
    #[error("Invalid conversion type: {0}")]
    InvalidType(String),

    /// No cached ratios and the refresh failed.
    #[error("Ratios unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Result type for ratio operations.
pub type RatioResult<T> = Result<T, RatioError>;
