//! IndexSwap Common Types
//!
//! Shared types used across the IndexSwap crates: the ratio set served and
//! converted with, and the clock abstraction the cache is driven by.

pub mod error;
pub mod ratio;
pub mod time;

pub use error::*;
pub use ratio::*;
pub use time::*;
