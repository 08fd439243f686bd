//! HTTP transport used for listing, player and stream-map requests

use crate::error::TubeError;
use crate::platform::retry::{RetryConfig, RetryExecutor};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, ClientBuilder, Method};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra request headers as name/value pairs
pub type Headers = Vec<(String, String)>;

/// Asynchronous fetch capability consumed by the core
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, TubeError>;

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Vec<u8>, TubeError>;
}

/// Bearer authorization header for an access token
pub fn bearer(token: &str) -> (String, String) {
    ("Authorization".to_string(), format!("Bearer {}", token))
}

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Retries for transient failures
    pub max_retries: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Proxy URL
    pub proxy_url: Option<String>,
    /// Request rate ceiling shared by every caller of this transport
    pub requests_per_second: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: None,
            proxy_url: None,
            requests_per_second: 10,
        }
    }
}

/// `reqwest` backed [`Transport`]
pub struct HttpTransport {
    client: Client,
    config: HttpClientConfig,
    limiter: DefaultDirectRateLimiter,
    retry: RetryExecutor,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TubeError> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, TubeError> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if let Some(proxy_url) = &config.proxy_url {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!("Ignoring invalid proxy {}: {}", proxy_url, e),
            }
        }

        let client = builder.build()?;
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rate));
        let retry = RetryExecutor::with_config(
            RetryConfig::default().with_max_retries(config.max_retries),
        );

        Ok(Self {
            client,
            config,
            limiter,
            retry,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, TubeError> {
        self.retry
            .execute(|| {
                let method = method.clone();
                let body = body.clone();
                async move {
                    self.limiter.until_ready().await;
                    debug!("{} {}", method, url);

                    let mut request = self.client.request(method, url);
                    for (name, value) in headers {
                        request = request.header(name.as_str(), value.as_str());
                    }
                    if let Some(body) = body {
                        request = request.body(body);
                    }

                    let response = request.send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(TubeError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    Ok(response.bytes().await?.to_vec())
                }
            })
            .await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, TubeError> {
        self.send(Method::GET, url, headers, None).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Vec<u8>, TubeError> {
        self.send(Method::POST, url, headers, Some(body)).await
    }
}
