//! Conversion between instrument prices.

use std::fmt;
use std::str::FromStr;

use indexswap_common::{RatioKey, RatioSet};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::RatioError;

/// How a ratio is applied to the input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Multiply,
    Divide,
}

/// The six supported conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionType {
    QqqToNdx,
    QqqToNq,
    NqToQqq,
    NdxToQqq,
    EsToSpy,
    SpyToEs,
}

impl ConversionType {
    pub const ALL: [ConversionType; 6] = [
        ConversionType::QqqToNdx,
        ConversionType::QqqToNq,
        ConversionType::NqToQqq,
        ConversionType::NdxToQqq,
        ConversionType::EsToSpy,
        ConversionType::SpyToEs,
    ];

    /// Wire name, e.g. `qqq_to_ndx`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionType::QqqToNdx => "qqq_to_ndx",
            ConversionType::QqqToNq => "qqq_to_nq",
            ConversionType::NqToQqq => "nq_to_qqq",
            ConversionType::NdxToQqq => "ndx_to_qqq",
            ConversionType::EsToSpy => "es_to_spy",
            ConversionType::SpyToEs => "spy_to_es",
        }
    }

    /// Ratio and operation this conversion applies.
    pub fn plan(&self) -> (RatioKey, Operation) {
        match self {
            ConversionType::QqqToNdx => (RatioKey::NdxQqq, Operation::Multiply),
            ConversionType::QqqToNq => (RatioKey::NqQqq, Operation::Multiply),
            ConversionType::NqToQqq => (RatioKey::NqQqq, Operation::Divide),
            ConversionType::NdxToQqq => (RatioKey::NdxQqq, Operation::Divide),
            ConversionType::EsToSpy => (RatioKey::EsSpy, Operation::Divide),
            ConversionType::SpyToEs => (RatioKey::EsSpy, Operation::Multiply),
        }
    }

    /// The conversion that undoes this one.
    pub fn inverse(&self) -> ConversionType {
        match self {
            ConversionType::QqqToNdx => ConversionType::NdxToQqq,
            ConversionType::NdxToQqq => ConversionType::QqqToNdx,
            ConversionType::QqqToNq => ConversionType::NqToQqq,
            ConversionType::NqToQqq => ConversionType::QqqToNq,
            ConversionType::EsToSpy => ConversionType::SpyToEs,
            ConversionType::SpyToEs => ConversionType::EsToSpy,
        }
    }
}

impl FromStr for ConversionType {
    type Err = RatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversionType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RatioError::InvalidType(s.to_string()))
    }
}

impl fmt::Display for ConversionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round to two decimal places, halves away from zero.
///
/// Rounds the exact binary value of `value`, so `1.005` (stored as
/// `1.00499999…`) becomes `1.0`, the same answer `Number(x.toFixed(2))` gives.
/// Values outside the decimal range are rounded in floating point instead.
pub fn round_to_cents(value: f64) -> f64 {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or_else(|| (value * 100.0).round() / 100.0)
}

/// Apply a conversion to `value` using `ratios`.
pub fn convert(kind: ConversionType, value: f64, ratios: &RatioSet) -> f64 {
    let (key, op) = kind.plan();
    let ratio = ratios.get(key);
    let raw = match op {
        Operation::Multiply => value * ratio,
        Operation::Divide => value / ratio,
    };
    round_to_cents(raw)
}
