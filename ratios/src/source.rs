//! Ratio source trait and implementations.

use std::time::Duration;

use async_trait::async_trait;
use indexswap_common::RatioSet;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use crate::error::{RatioError, RatioResult};
use crate::extract::extract_ratios;

/// Trait for anything that can produce a fresh ratio set.
#[async_trait]
pub trait RatioSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch the current ratios.
    async fn fetch_ratios(&self) -> RatioResult<RatioSet>;
}

/// Configuration for [`HtmlRatioSource`].
#[derive(Debug, Clone)]
pub struct HtmlRatioSourceConfig {
    /// Page carrying the ratio script.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts for transport failures and 503 responses.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub backoff_base: Duration,
    /// User-Agent header sent with each request.
    pub user_agent: String,
}

impl Default for HtmlRatioSourceConfig {
    fn default() -> Self {
        Self {
            url: "https://spyconverter.com/".to_string(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Scrapes the ratios out of a public HTML page.
pub struct HtmlRatioSource {
    client: Client,
    config: HtmlRatioSourceConfig,
}

impl HtmlRatioSource {
    /// Create a new source with its own HTTP client.
    pub fn new(config: HtmlRatioSourceConfig) -> RatioResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| RatioError::Fetch(format!("build http client: {e}")))?;

        Ok(Self { client, config })
    }

    /// GET the page body, retrying transport failures and 503s with backoff.
    async fn fetch_page(&self) -> RatioResult<String> {
        let mut attempt = 1;
        loop {
            let error = match self.client.get(&self.config.url).send().await {
                Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE => {
                    RatioError::Fetch(format!("HTTP {}", response.status()))
                }
                Ok(response) if !response.status().is_success() => {
                    return Err(RatioError::Fetch(format!("HTTP {}", response.status())));
                }
                Ok(response) => {
                    return response
                        .text()
                        .await
                        .map_err(|e| RatioError::Fetch(format!("read body: {e}")));
                }
                Err(e) => RatioError::Fetch(e.to_string()),
            };

            if attempt >= self.config.max_attempts {
                return Err(error);
            }

            let delay = self.config.backoff_base * 2u32.saturating_pow(attempt - 1);
            warn!(
                url = %self.config.url,
                attempt,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Ratio page request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl RatioSource for HtmlRatioSource {
    fn name(&self) -> &str {
        "HTML"
    }

    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn fetch_ratios(&self) -> RatioResult<RatioSet> {
        let html = self.fetch_page().await?;
        debug!(bytes = html.len(), "Fetched ratio page");
        extract_ratios(&html)
    }
}

/// Mock ratio source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRatioSource {
    name: String,
    outcomes: parking_lot::Mutex<std::collections::VecDeque<RatioResult<RatioSet>>>,
    fallback: parking_lot::Mutex<RatioResult<RatioSet>>,
    calls: std::sync::atomic::AtomicUsize,
    latency: Option<Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRatioSource {
    /// Create a mock that fails until told otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            fallback: parking_lot::Mutex::new(Err(RatioError::Fetch(
                "no scripted outcome".to_string(),
            ))),
            calls: std::sync::atomic::AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a one-shot outcome, served before the fallback.
    pub fn push_outcome(&self, outcome: RatioResult<RatioSet>) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Set the outcome returned once the queue is empty.
    pub fn set_fallback(&self, outcome: RatioResult<RatioSet>) {
        *self.fallback.lock() = outcome;
    }

    /// Number of fetches performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RatioSource for MockRatioSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_ratios(&self) -> RatioResult<RatioSet> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let queued = self.outcomes.lock().pop_front();
        match queued {
            Some(outcome) => outcome,
            None => self.fallback.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = "<html><script>\
        let es_spy_ratio = 10.5;\
        let nq_qqq_ratio = 41.5;\
        let ndx_qqq_ratio = 41.25;\
        </script></html>";

    /// Serve one canned response per connection, in order, then stop.
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{addr}/")
    }

    fn source_for(url: String) -> HtmlRatioSource {
        HtmlRatioSource::new(HtmlRatioSourceConfig {
            url,
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_html_source_fetches_and_parses() {
        let url = serve(vec![(200, PAGE)]).await;
        let set = source_for(url).fetch_ratios().await.unwrap();

        assert_eq!(set, RatioSet::new(41.25, 41.5, 10.5).unwrap());
    }

    #[tokio::test]
    async fn test_html_source_retries_503() {
        let url = serve(vec![(503, "busy"), (503, "busy"), (200, PAGE)]).await;
        let set = source_for(url).fetch_ratios().await.unwrap();

        assert_eq!(set.get(indexswap_common::RatioKey::EsSpy), 10.5);
    }

    #[tokio::test]
    async fn test_html_source_fails_fast_on_other_status() {
        let url = serve(vec![(500, "boom")]).await;
        let result = source_for(url).fetch_ratios().await;

        assert!(matches!(result, Err(RatioError::Fetch(msg)) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_html_source_parse_error() {
        let url = serve(vec![(200, "<html><body>maintenance</body></html>")]).await;
        let result = source_for(url).fetch_ratios().await;

        assert_eq!(result, Err(RatioError::Parse("script not found".to_string())));
    }

    #[tokio::test]
    async fn test_mock_source_scripted_outcomes() {
        let source = MockRatioSource::new("mock");
        source.push_outcome(Ok(RatioSet::defaults()));

        assert_eq!(source.fetch_ratios().await, Ok(RatioSet::defaults()));
        assert!(matches!(source.fetch_ratios().await, Err(RatioError::Fetch(_))));
        assert_eq!(source.calls(), 2);
    }
}
