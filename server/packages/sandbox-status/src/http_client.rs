use std::env;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method, Response};
use sandbox_status_error::SandboxError;
use tokio::time::{sleep, timeout};

use crate::config::ApiConfig;

const NO_SYSTEM_PROXY_ENV: &str = "SANDBOX_STATUS_NO_SYSTEM_PROXY";

fn disable_system_proxy() -> bool {
    env::var(NO_SYSTEM_PROXY_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

pub fn client_builder() -> ClientBuilder {
    let builder = reqwest::Client::builder();
    if disable_system_proxy() {
        builder.no_proxy()
    } else {
        builder
    }
}

/// Per-call overrides; anything left `None` falls back to [`ApiConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOptions {
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl RetryOptions {
    pub fn resolve(&self, defaults: &ApiConfig) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            timeout: self.timeout.unwrap_or(defaults.request_timeout),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Total attempts, counting the first one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Fetch failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl From<FetchError> for SandboxError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Exhausted {
                attempts,
                last_error,
            } => SandboxError::FetchFailed {
                attempts,
                message: last_error,
            },
        }
    }
}

/// Runs `operation` until it succeeds, bounding each attempt by `policy.timeout`.
///
/// Attempts are numbered from zero up to and including `policy.max_retries`.
/// Any `Err` or an elapsed timeout counts as a failed attempt; between
/// attempts the loop sleeps a fixed `policy.retry_delay`. The future of a
/// timed-out attempt is dropped, which cancels whatever it was doing.
pub async fn retry_with_timeout<F, Fut, T, E>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut last_error = String::new();
    for attempt in 0..=policy.max_retries {
        last_error = match timeout(policy.timeout, operation(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("request timed out after {}ms", policy.timeout.as_millis()),
        };

        if attempt == policy.max_retries {
            break;
        }

        tracing::warn!(
            attempt = attempt + 1,
            retry_delay_ms = policy.retry_delay.as_millis() as u64,
            error = %last_error,
            "fetch attempt failed, retrying"
        );
        sleep(policy.retry_delay).await;
    }

    Err(FetchError::Exhausted {
        attempts: policy.attempts(),
        last_error,
    })
}

/// Issues one logical request with retries.
///
/// Every received response is returned as-is, whatever its status code; only
/// transport errors and timeouts are retried.
pub async fn fetch_with_retry(
    client: &Client,
    target: &str,
    options: &RequestOptions,
    policy: RetryPolicy,
) -> Result<Response, FetchError> {
    retry_with_timeout(policy, |_| {
        let mut request = client
            .request(options.method.clone(), target)
            .headers(options.headers.clone());
        if let Some(body) = options.body.as_ref() {
            request = request.body(body.clone());
        }
        request.send()
    })
    .await
}

/// Shared client plus the retry defaults applied to every call.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    defaults: ApiConfig,
}

impl HttpFetcher {
    pub fn new(defaults: ApiConfig) -> Result<Self, SandboxError> {
        let client = client_builder()
            .build()
            .map_err(|err| SandboxError::Internal {
                message: format!("failed to build http client: {err}"),
            })?;
        Ok(Self::with_client(client, defaults))
    }

    pub fn with_client(client: Client, defaults: ApiConfig) -> Self {
        Self { client, defaults }
    }

    pub async fn fetch(
        &self,
        target: &str,
        options: &RequestOptions,
        retry: RetryOptions,
    ) -> Result<Response, FetchError> {
        let policy = retry.resolve(&self.defaults);
        fetch_with_retry(&self.client, target, options, policy).await
    }
}
