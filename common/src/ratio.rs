//! Index/ETF price ratio types.

use serde::Serialize;
use std::fmt;

use crate::error::RatioSetError;

/// Identifies one of the three tracked ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatioKey {
    /// NDX index level per QQQ share.
    NdxQqq,
    /// NQ future price per QQQ share.
    NqQqq,
    /// ES future price per SPY share.
    EsSpy,
}

impl RatioKey {
    /// All keys, in the order they appear in a serialized set.
    pub const ALL: [RatioKey; 3] = [RatioKey::NdxQqq, RatioKey::NqQqq, RatioKey::EsSpy];

    /// Public label used as the JSON key.
    pub fn label(&self) -> &'static str {
        match self {
            RatioKey::NdxQqq => "NDX/QQQ Ratio",
            RatioKey::NqQqq => "NQ/QQQ Ratio",
            RatioKey::EsSpy => "ES/SPY Ratio",
        }
    }

    /// Variable name the ratio is published under on the source page.
    pub fn marker(&self) -> &'static str {
        match self {
            RatioKey::NdxQqq => "ndx_qqq_ratio",
            RatioKey::NqQqq => "nq_qqq_ratio",
            RatioKey::EsSpy => "es_spy_ratio",
        }
    }
}

impl fmt::Display for RatioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A complete set of the three ratios.
///
/// A set is only ever built whole: every value is checked to be finite and
/// strictly positive, so a partially valid set cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioSet {
    #[serde(rename = "NDX/QQQ Ratio")]
    ndx_qqq: f64,
    #[serde(rename = "NQ/QQQ Ratio")]
    nq_qqq: f64,
    #[serde(rename = "ES/SPY Ratio")]
    es_spy: f64,
}

impl RatioSet {
    /// Build a validated ratio set.
    pub fn new(ndx_qqq: f64, nq_qqq: f64, es_spy: f64) -> Result<Self, RatioSetError> {
        let set = Self {
            ndx_qqq,
            nq_qqq,
            es_spy,
        };
        for key in RatioKey::ALL {
            let value = set.get(key);
            if !value.is_finite() || value <= 0.0 {
                return Err(RatioSetError::InvalidValue { key, value });
            }
        }
        Ok(set)
    }

    /// Ratios the service ships with, used to seed the cache.
    pub fn defaults() -> Self {
        Self {
            ndx_qqq: 41.10241216829076,
            nq_qqq: 41.29471200210854,
            es_spy: 10.072138887159946,
        }
    }

    /// Look up a single ratio.
    pub fn get(&self, key: RatioKey) -> f64 {
        match key {
            RatioKey::NdxQqq => self.ndx_qqq,
            RatioKey::NqQqq => self.nq_qqq,
            RatioKey::EsSpy => self.es_spy,
        }
    }
}

impl fmt::Display for RatioSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NDX/QQQ={} NQ/QQQ={} ES/SPY={}",
            self.ndx_qqq, self.nq_qqq, self.es_spy
        )
    }
}
