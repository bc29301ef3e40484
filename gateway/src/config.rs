//! Gateway configuration.

use std::str::FromStr;
use std::time::Duration;

use indexswap_ratios::{HtmlRatioSourceConfig, RefreshPolicy};
use tracing::warn;

/// Which flavour of the API this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Ratio listing plus POST conversions.
    Converter,
    /// Ratio listing and an informational root payload only.
    Listing,
}

impl Variant {
    /// Whether POST requests are treated as conversions.
    pub fn accepts_conversions(&self) -> bool {
        matches!(self, Variant::Converter)
    }

    /// Whether `/` answers with the endpoint listing.
    pub fn serves_root_info(&self) -> bool {
        matches!(self, Variant::Listing)
    }

    /// Value of the `Access-Control-Allow-Methods` header.
    pub fn allow_methods(&self) -> &'static str {
        match self {
            Variant::Converter => "GET, POST, OPTIONS",
            Variant::Listing => "GET, OPTIONS",
        }
    }

    /// Trusted origin used when none is configured.
    pub fn default_origin(&self) -> &'static str {
        match self {
            Variant::Converter => "https://indexswapy.netlify.app",
            Variant::Listing => "https://spyconverter.com",
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "converter" => Ok(Variant::Converter),
            "listing" => Ok(Variant::Listing),
            other => Err(format!("unknown gateway variant: {other}")),
        }
    }
}

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// API flavour.
    pub variant: Variant,
    /// Prefix stripped from request paths before routing.
    pub path_prefix: String,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Trusted CORS origin; the variant's default when unset.
    pub allow_origin: Option<String>,
    /// When the ratio cache is refreshed.
    pub refresh_policy: RefreshPolicy,
    /// How long fetched ratios stay fresh.
    pub refresh_interval: Duration,
    /// Pre-seed the cache with the built-in ratios.
    pub seed_defaults: bool,
    /// Accept `value: 0` in conversion requests.
    pub allow_zero_value: bool,
    /// Ratio page scraping settings.
    pub source: HtmlRatioSourceConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8888,
            variant: Variant::Converter,
            path_prefix: String::new(),
            max_body_bytes: 64 * 1024,
            allow_origin: None,
            refresh_policy: RefreshPolicy::OnAccess,
            refresh_interval: Duration::from_secs(15 * 60),
            seed_defaults: true,
            allow_zero_value: false,
            source: HtmlRatioSourceConfig::default(),
        }
    }
}

fn parse_or_warn<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = raw, "Ignoring unparsable configuration value");
            None
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("GATEWAY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = var("GATEWAY_LISTEN_PORT") {
            if let Some(port) = parse_or_warn("GATEWAY_LISTEN_PORT", &port) {
                config.listen_port = port;
            }
        }

        if let Some(variant) = var("GATEWAY_VARIANT") {
            if let Some(variant) = parse_or_warn("GATEWAY_VARIANT", &variant) {
                config.variant = variant;
            }
        }

        if let Some(prefix) = var("GATEWAY_PATH_PREFIX") {
            config.path_prefix = prefix.trim().trim_end_matches('/').to_string();
        }

        if let Some(limit) = var("GATEWAY_MAX_BODY_BYTES") {
            if let Some(limit) = parse_or_warn("GATEWAY_MAX_BODY_BYTES", &limit) {
                config.max_body_bytes = limit;
            }
        }

        if let Some(origin) = var("CORS_ALLOW_ORIGIN") {
            let origin = origin.trim();
            if !origin.is_empty() {
                config.allow_origin = Some(origin.to_string());
            }
        }

        if let Some(policy) = var("REFRESH_POLICY") {
            if let Some(policy) = parse_or_warn("REFRESH_POLICY", &policy) {
                config.refresh_policy = policy;
            }
        }

        if let Some(secs) = var("RATIO_REFRESH_INTERVAL_SECS") {
            if let Some(secs) = parse_or_warn::<u64>("RATIO_REFRESH_INTERVAL_SECS", &secs) {
                config.refresh_interval = Duration::from_secs(secs);
            }
        }

        if let Some(seed) = var("RATIO_SEED_DEFAULTS") {
            config.seed_defaults = parse_bool(&seed);
        }

        if let Some(allow) = var("ALLOW_ZERO_VALUE") {
            config.allow_zero_value = parse_bool(&allow);
        }

        if let Some(url) = var("RATIO_SOURCE_URL") {
            config.source.url = url.trim().to_string();
        }

        if let Some(secs) = var("RATIO_SOURCE_TIMEOUT_SECS") {
            if let Some(secs) = parse_or_warn::<u64>("RATIO_SOURCE_TIMEOUT_SECS", &secs) {
                config.source.timeout = Duration::from_secs(secs);
            }
        }

        if let Some(attempts) = var("RATIO_SOURCE_MAX_ATTEMPTS") {
            if let Some(attempts) = parse_or_warn("RATIO_SOURCE_MAX_ATTEMPTS", &attempts) {
                config.source.max_attempts = attempts;
            }
        }

        config
    }

    /// Trusted CORS origin in effect.
    pub fn allow_origin(&self) -> &str {
        self.allow_origin
            .as_deref()
            .unwrap_or_else(|| self.variant.default_origin())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("Max body size cannot be 0".to_string());
        }

        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be zero".to_string());
        }

        if !self.path_prefix.is_empty() && !self.path_prefix.starts_with('/') {
            return Err("Path prefix must start with '/'".to_string());
        }

        if !(self.source.url.starts_with("http://") || self.source.url.starts_with("https://")) {
            return Err(format!("Ratio source URL must be http(s): {}", self.source.url));
        }

        if self.source.max_attempts == 0 {
            return Err("Ratio source max attempts cannot be 0".to_string());
        }

        if self.source.timeout.is_zero() {
            return Err("Ratio source timeout cannot be zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> GatewayConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.allow_origin(), "https://indexswapy.netlify.app");
        assert_eq!(config.refresh_policy, RefreshPolicy::OnAccess);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = GatewayConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.refresh_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.max_body_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.source.url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_vars() {
        let config = from_map(&[
            ("GATEWAY_LISTEN_PORT", "9000"),
            ("GATEWAY_VARIANT", "listing"),
            ("GATEWAY_PATH_PREFIX", "/.netlify/functions/spy-converter/"),
            ("GATEWAY_MAX_BODY_BYTES", "2048"),
            ("REFRESH_POLICY", "both"),
            ("RATIO_REFRESH_INTERVAL_SECS", "1800"),
            ("RATIO_SEED_DEFAULTS", "false"),
            ("ALLOW_ZERO_VALUE", "yes"),
        ]);

        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.variant, Variant::Listing);
        assert_eq!(config.path_prefix, "/.netlify/functions/spy-converter");
        assert_eq!(config.max_body_bytes, 2048);
        assert_eq!(config.refresh_policy, RefreshPolicy::Both);
        assert_eq!(config.refresh_interval, Duration::from_secs(1800));
        assert!(!config.seed_defaults);
        assert!(config.allow_zero_value);
        assert_eq!(config.allow_origin(), "https://spyconverter.com");
        assert_eq!(config.variant.allow_methods(), "GET, OPTIONS");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = from_map(&[
            ("GATEWAY_LISTEN_PORT", "eighty"),
            ("REFRESH_POLICY", "sometimes"),
            ("CORS_ALLOW_ORIGIN", "  "),
        ]);

        assert_eq!(config.listen_port, 8888);
        assert_eq!(config.refresh_policy, RefreshPolicy::OnAccess);
        assert_eq!(config.allow_origin, None);
    }
}
