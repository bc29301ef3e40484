//! Request routing.
//!
//! Maps a `(method, path, body)` triple onto the API's handful of responses.
//! Transport concerns (headers, CORS, body collection) live in
//! [`crate::server`].

use std::sync::Arc;

use hyper::{Method, StatusCode};
use indexswap_common::to_iso8601;
use indexswap_ratios::{convert, ConversionType, RefreshScheduler};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::{GatewayConfig, Variant};
use crate::error::{GatewayError, INVALID_VALUE, MISSING_TYPE_OR_VALUE};
use crate::metrics::Metrics;

/// Paths that list the current ratios.
pub const RATIO_PATHS: [&str; 3] = ["/ratios", "/api/ratios", "/data"];

/// Endpoints advertised by the root payload.
pub const ENDPOINTS: [&str; 4] = ["/", "/api/ratios", "/ratios", "/data"];

/// A routed response, before transport headers are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: StatusCode,
    /// JSON body; `None` for an empty body.
    pub body: Option<Value>,
}

impl RouteResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
        }
    }

    fn error(error: &GatewayError) -> Self {
        Self {
            status: error.status_code(),
            body: Some(error.body()),
        }
    }
}

/// JavaScript-style truthiness of an optional JSON value.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Numeric reading of a conversion input: JSON numbers and numeric strings.
fn as_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

/// Routes requests to conversions, ratio listings and the info payload.
pub struct RequestRouter {
    scheduler: RefreshScheduler,
    variant: Variant,
    allow_zero_value: bool,
    metrics: Arc<Metrics>,
}

impl RequestRouter {
    /// Create a new router.
    pub fn new(scheduler: RefreshScheduler, variant: Variant, allow_zero_value: bool) -> Self {
        Self {
            scheduler,
            variant,
            allow_zero_value,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Create a router with the variant and input rules from `config`.
    pub fn from_config(scheduler: RefreshScheduler, config: &GatewayConfig) -> Self {
        Self::new(scheduler, config.variant, config.allow_zero_value)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Route one request. Never fails: every error becomes a response.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn route(&self, method: &Method, path: &str, body: Option<&str>) -> RouteResponse {
        let response = match self.dispatch(method, path, body).await {
            Ok(response) => response,
            Err(e) => {
                match e {
                    GatewayError::Unavailable(_) => warn!(error = %e, "Request failed"),
                    _ => debug!(error = %e, "Request rejected"),
                }
                RouteResponse::error(&e)
            }
        };

        self.metrics.record_response(response.status);
        response
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<RouteResponse, GatewayError> {
        if method == Method::OPTIONS {
            return Ok(RouteResponse::empty());
        }

        if method == Method::POST && self.variant.accepts_conversions() {
            return self.handle_conversion(body).await;
        }

        if self.variant.serves_root_info() && (path == "/" || path.is_empty()) {
            return Ok(RouteResponse::ok(json!({
                "status": "ok",
                "message": "SPY Converter API is running",
                "endpoints": ENDPOINTS,
            })));
        }

        if RATIO_PATHS.contains(&path) {
            return self.handle_ratios().await;
        }

        Err(GatewayError::NotFound)
    }

    async fn handle_conversion(&self, body: Option<&str>) -> Result<RouteResponse, GatewayError> {
        let (kind, amount) = self.parse_conversion(body)?;
        let ratios = self.scheduler.current_ratios().await?;
        let result = convert(kind, amount, &ratios);

        self.metrics.conversion_completed();
        info!(conversion = %kind, value = amount, result, "Conversion completed");

        Ok(RouteResponse::ok(json!({
            "status": "ok",
            "result": result,
        })))
    }

    async fn handle_ratios(&self) -> Result<RouteResponse, GatewayError> {
        let ratios = self.scheduler.current_ratios().await?;
        let timestamp = to_iso8601(self.scheduler.clock().now());
        debug!(ratios = %ratios, "Ratios requested");

        Ok(RouteResponse::ok(json!({
            "status": "ok",
            "timestamp": timestamp,
            "ratios": ratios,
        })))
    }

    /// Validate a conversion body into a type and numeric value.
    ///
    /// `value: 0` counts as missing unless zero values are allowed.
    fn parse_conversion(&self, body: Option<&str>) -> Result<(ConversionType, f64), GatewayError> {
        let request: Value = serde_json::from_str(body.unwrap_or_default())?;
        let kind = request.get("type");
        let value = request.get("value");

        let zero_allowed = self.allow_zero_value
            && value.and_then(Value::as_f64).is_some_and(|v| v == 0.0);
        if !is_truthy(kind) || !(zero_allowed || is_truthy(value)) {
            return Err(GatewayError::BadRequest(MISSING_TYPE_OR_VALUE.to_string()));
        }

        let kind: ConversionType = kind
            .and_then(Value::as_str)
            .ok_or(GatewayError::InvalidType)?
            .parse()?;

        let amount = value
            .and_then(as_amount)
            .ok_or_else(|| GatewayError::BadRequest(INVALID_VALUE.to_string()))?;

        Ok((kind, amount))
    }
}
