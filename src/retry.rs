//! Bounded retry and admission control for provider calls.
//!
//! Every network-calling stage goes through a [`CallPolicy`]: a shared
//! semaphore caps in-flight calls, and failed attempts are retried with a
//! fixed wait. A permit is held only while an attempt is running, never
//! while waiting to retry.
//!
//! Errors wrapped in [`PermanentError`] (anywhere in the error chain) are
//! returned immediately without retrying.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;

use crate::config::RetryConfig;

/// Marker for failures that retrying cannot fix (bad request, bad key).
#[derive(Debug)]
pub struct PermanentError(pub String);

impl fmt::Display for PermanentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PermanentError {}

pub fn permanent(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(PermanentError(message.into()))
}

pub fn is_permanent(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.downcast_ref::<PermanentError>().is_some())
}

/// Classify a non-success HTTP response.
///
/// 429 and 5xx are transient; every other status is permanent.
pub fn http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    let message = format!("{} API error ({}): {}", provider, status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        anyhow::anyhow!(message)
    } else {
        permanent(message)
    }
}

/// Send a JSON request and parse the JSON response.
///
/// Network failures stay transient; error statuses go through [`http_error`].
pub async fn send_json(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} request failed", provider))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(http_error(provider, status, &body));
    }

    response
        .json()
        .await
        .with_context(|| format!("{} returned an invalid JSON body", provider))
}

#[derive(Clone)]
pub struct CallPolicy {
    gate: Arc<Semaphore>,
    max_attempts: u32,
    wait: Duration,
}

impl CallPolicy {
    pub fn new(max_in_flight: usize, max_attempts: u32, wait: Duration) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(max_in_flight.max(1))),
            max_attempts: max_attempts.max(1),
            wait,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_in_flight, config.max_attempts, config.wait())
    }

    /// Run `call` under the gate, retrying transient failures.
    ///
    /// `label` names the unit of work in logs and in the final error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = {
                let _permit = self.gate.acquire().await?;
                call().await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if is_permanent(&err) => {
                    return Err(err.context(format!("{}: permanent failure", label)));
                }
                Err(err) if attempt >= self.max_attempts => {
                    return Err(err.context(format!(
                        "{}: failed after {} attempts",
                        label, attempt
                    )));
                }
                Err(err) => {
                    tracing::warn!(
                        unit = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %format!("{:#}", err),
                        "call failed, retrying in {:?}",
                        self.wait
                    );
                    tokio::time::sleep(self.wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run `fut` under the gate without retrying.
    pub async fn admit<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self.gate.acquire().await?;
        fut.await
    }
}
