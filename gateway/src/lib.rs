//! IndexSwap Gateway
//!
//! HTTP front end for the ratio engine: lists the current ratios and converts
//! prices between the index, ETF and futures instruments.

pub mod config;
pub mod error;
pub mod metrics;
pub mod router;
pub mod server;

pub use config::{GatewayConfig, Variant};
pub use error::GatewayError;
pub use router::{RequestRouter, RouteResponse};
pub use server::HttpServer;
