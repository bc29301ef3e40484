//! IndexSwap Ratio Engine
//!
//! Keeps the NDX/QQQ, NQ/QQQ and ES/SPY ratios current and converts prices
//! with them.
//!
//! # Features
//!
//! - Ratio scraping from a public page's inline script, with retry
//! - Ratio caching with a configurable refresh interval
//! - Timer-driven and on-access refresh with single-flight deduplication
//! - Conversion with two-decimal rounding
//!
//! # Example
//!
//! ```rust,ignore
//! use indexswap_ratios::{HtmlRatioSource, RatioCache, RefreshPolicy, RefreshScheduler};
//!
//! let source = Arc::new(HtmlRatioSource::new(Default::default())?);
//! let cache = Arc::new(RatioCache::seeded(RatioSet::defaults(), Duration::minutes(15)));
//! let scheduler = RefreshScheduler::new(source, cache, Arc::new(SystemClock), RefreshPolicy::OnAccess);
//!
//! let ratios = scheduler.current_ratios().await?;
//! let ndx = convert(ConversionType::QqqToNdx, 100.0, &ratios);
//! ```

pub mod cache;
pub mod conversion;
pub mod error;
pub mod extract;
pub mod refresh;
pub mod source;

pub use cache::{RatioCache, SharedRatioCache};
pub use conversion::{convert, round_to_cents, ConversionType, Operation};
pub use error::{RatioError, RatioResult};
pub use refresh::{RefreshHandle, RefreshPolicy, RefreshScheduler, RefreshStatsSnapshot};
pub use source::{HtmlRatioSource, HtmlRatioSourceConfig, RatioSource};

#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRatioSource;
