//! HTTP/1 transport for the request router.
//!
//! Collects the request body, strips the deployment path prefix, and wraps
//! every routed response with the JSON content type and CORS headers.

use std::borrow::Cow;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{
    HeaderValue, InvalidHeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::router::{RequestRouter, RouteResponse};

/// Collect a request body, refusing anything over `limit` bytes.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, GatewayError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(GatewayError::BadRequest(format!(
            "Request body exceeds {limit} bytes"
        ))),
        Err(e) => Err(GatewayError::BadRequest(format!(
            "Failed to read request body: {e}"
        ))),
    }
}

/// Serves a [`RequestRouter`] over HTTP/1.
pub struct HttpServer {
    router: RequestRouter,
    path_prefix: String,
    max_body_bytes: usize,
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
}

impl HttpServer {
    /// Create a server for `router` with the prefix and CORS settings from `config`.
    pub fn new(router: RequestRouter, config: &GatewayConfig) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(config.allow_origin())?,
            allow_methods: HeaderValue::from_static(router.variant().allow_methods()),
            path_prefix: config.path_prefix.clone(),
            max_body_bytes: config.max_body_bytes,
            router,
        })
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    /// Route path for a request path: the configured prefix is removed when
    /// it matches on a segment boundary.
    pub fn route_path<'a>(&self, path: &'a str) -> &'a str {
        if self.path_prefix.is_empty() {
            return path;
        }
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    #[instrument(
        skip_all,
        fields(request_id = %Uuid::now_v7(), method = %req.method(), path = %req.uri().path())
    )]
    async fn handle(self: Arc<Self>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let routed = match self.route_request(req).await {
            Ok(routed) => routed,
            Err(e) => {
                debug!(error = %e, "Request body rejected");
                self.router.metrics().record_response(e.status_code());
                RouteResponse {
                    status: e.status_code(),
                    body: Some(e.body()),
                }
            }
        };

        debug!(status = %routed.status, "Request handled");
        Ok(self.respond(routed))
    }

    async fn route_request(&self, req: Request<Incoming>) -> Result<RouteResponse, GatewayError> {
        let (parts, body) = req.into_parts();
        let bytes = read_body(body, self.max_body_bytes).await?;

        // Only conversions parse the body; other methods ignore its encoding.
        let text = if parts.method == Method::POST {
            Cow::Borrowed(std::str::from_utf8(&bytes).map_err(|e| {
                GatewayError::BadRequest(format!("Request body is not UTF-8: {e}"))
            })?)
        } else {
            String::from_utf8_lossy(&bytes)
        };

        let path = self.route_path(parts.uri.path());
        Ok(self.router.route(&parts.method, path, Some(&*text)).await)
    }

    fn respond(&self, routed: RouteResponse) -> Response<Full<Bytes>> {
        let body = routed
            .body
            .map(|value| Bytes::from(value.to_string()))
            .unwrap_or_default();

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = routed.status;

        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    ///
    /// Connections already accepted are left to finish on their own tasks.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                () = &mut shutdown => {
                    info!("Listener stopped");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| server.clone().handle(req));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(error = %e, peer = %peer, "Connection error");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use chrono::Duration;
    use indexswap_common::{ManualClock, RatioSet};
    use indexswap_ratios::{MockRatioSource, RatioCache, RefreshPolicy, RefreshScheduler};
    use std::net::SocketAddr;
    use tokio::sync::oneshot;

    fn server(config: &GatewayConfig) -> Arc<HttpServer> {
        let scheduler = RefreshScheduler::new(
            Arc::new(MockRatioSource::new("mock")),
            Arc::new(RatioCache::seeded(RatioSet::defaults(), Duration::minutes(15))),
            Arc::new(ManualClock::new(indexswap_common::now())),
            RefreshPolicy::OnAccess,
        );
        let router = RequestRouter::from_config(scheduler, config);
        Arc::new(HttpServer::new(router, config).unwrap())
    }

    /// Tests run through a real listener since `Incoming` cannot be
    /// constructed directly.
    async fn start(config: GatewayConfig) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = server(&config);
        tokio::spawn(async move {
            let _ = server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await;
        });

        (addr, stop_tx)
    }

    struct RawResponse {
        status: u16,
        head: String,
        body: String,
    }

    async fn send(addr: SocketAddr, method: &str, path: &str, body: &str) -> RawResponse {
        send_bytes(addr, method, path, body.as_bytes()).await
    }

    /// Minimal HTTP/1.1 client over a raw TcpStream.
    async fn send_bytes(addr: SocketAddr, method: &str, path: &str, body: &[u8]) -> RawResponse {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        let status = head
            .lines()
            .next()
            .unwrap()
            .split_whitespace()
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();

        RawResponse {
            status,
            head: head.to_ascii_lowercase(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_route_path() {
        let config = GatewayConfig {
            path_prefix: "/.netlify/functions/index-converter".to_string(),
            ..GatewayConfig::default()
        };
        let server = server(&config);

        assert_eq!(
            server.route_path("/.netlify/functions/index-converter/ratios"),
            "/ratios"
        );
        assert_eq!(server.route_path("/.netlify/functions/index-converter"), "");
        assert_eq!(server.route_path("/ratios"), "/ratios");
        assert_eq!(
            server.route_path("/.netlify/functions/index-converterx/ratios"),
            "/.netlify/functions/index-converterx/ratios"
        );
    }

    #[tokio::test]
    async fn test_conversion_over_http() {
        let (addr, stop) = start(GatewayConfig::default()).await;

        let response = send(addr, "POST", "/", r#"{"type":"qqq_to_ndx","value":100}"#).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"status":"ok","result":4110.24}"#);
        assert!(response
            .head
            .contains("access-control-allow-origin: https://indexswapy.netlify.app"));
        assert!(response
            .head
            .contains("access-control-allow-methods: get, post, options"));
        assert!(response.head.contains("access-control-allow-headers: content-type"));
        assert!(response.head.contains("content-type: application/json"));

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let (addr, stop) = start(GatewayConfig::default()).await;

        let response = send(addr, "OPTIONS", "/anything", "").await;

        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert!(response.head.contains("access-control-allow-origin"));

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn test_prefixed_listing_variant() {
        let config = GatewayConfig {
            variant: Variant::Listing,
            path_prefix: "/.netlify/functions/spy-converter".to_string(),
            allow_origin: Some("https://example.org".to_string()),
            ..GatewayConfig::default()
        };
        let (addr, stop) = start(config).await;

        let ratios = send(addr, "GET", "/.netlify/functions/spy-converter/api/ratios", "").await;
        assert_eq!(ratios.status, 200);
        assert!(ratios.body.contains(
            r#""ratios":{"NDX/QQQ Ratio":41.10241216829076,"NQ/QQQ Ratio":41.29471200210854,"ES/SPY Ratio":10.072138887159946}"#
        ));
        assert!(ratios.head.contains("access-control-allow-origin: https://example.org"));
        assert!(ratios.head.contains("access-control-allow-methods: get, options"));

        let root = send(addr, "GET", "/.netlify/functions/spy-converter", "").await;
        assert_eq!(root.status, 200);
        assert!(root.body.contains("SPY Converter API is running"));

        let missing = send(addr, "GET", "/elsewhere", "").await;
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body, r#"{"status":"error","message":"Endpoint not found"}"#);

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body = Full::new(Bytes::from_static(br#"{"type":"qqq_to_ndx","value":1}"#));
        let bytes = read_body(body, 64).await.unwrap();
        assert_eq!(&bytes[..], br#"{"type":"qqq_to_ndx","value":1}"#);
    }

    #[tokio::test]
    async fn test_read_body_over_limit() {
        let body = Full::new(Bytes::from(vec![b'x'; 100]));
        assert_eq!(
            read_body(body, 64).await,
            Err(GatewayError::BadRequest("Request body exceeds 64 bytes".to_string()))
        );
    }

    #[tokio::test]
    async fn test_non_utf8_body_only_matters_for_post() {
        let (addr, stop) = start(GatewayConfig::default()).await;
        let garbage: &[u8] = &[0xff, 0xfe, 0xfd];

        let options = send_bytes(addr, "OPTIONS", "/", garbage).await;
        assert_eq!(options.status, 200);
        assert!(options.body.is_empty());

        let ratios = send_bytes(addr, "GET", "/ratios", garbage).await;
        assert_eq!(ratios.status, 200);

        let post = send_bytes(addr, "POST", "/", garbage).await;
        assert_eq!(post.status, 400);
        assert!(post.body.contains("Request body is not UTF-8"));

        let _ = stop.send(());
    }
}
