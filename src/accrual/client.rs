// Reward client - one GET per order against the external accrual service
//
// Wire contract:
//   GET {base}/api/orders/{number}
//   200 -> {order, status, accrual?}
//   204 -> order not registered
//   429 -> rate limited, Retry-After in seconds
//   anything else -> client/server error
//
// No retries and no sleeping here: every timing decision belongs to the scheduler.

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// Fallback when a 429 carries no usable Retry-After header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Order status as reported by the reward service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

#[derive(Debug, Deserialize)]
struct AccrualResponse {
    order: String,
    status: RemoteStatus,
    #[serde(default)]
    accrual: Option<Decimal>,
}

/// Normalized outcome of a single reward-service call
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Success {
        status: RemoteStatus,
        amount: Option<Decimal>,
    },
    NotRegistered,
    RateLimited {
        retry_after_secs: u64,
    },
    /// Network failure, timeout, cancellation or a malformed body
    TransientError(String),
    /// Non-2xx status other than 429
    ClientError(u16),
}

#[async_trait]
pub trait RewardClient: Send + Sync {
    async fn fetch(&self, order_number: &str, cancel: &CancellationToken) -> FetchResult;
}

pub struct HttpRewardClient {
    client: Client,
    base_url: Url,
}

impl HttpRewardClient {
    /// `timeout` bounds each call on its own, regardless of the caller's deadline.
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid accrual system address {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Accrual system address cannot be a base URL: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    fn order_url(&self, order_number: &str) -> Option<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(&["api", "orders", order_number]);
        Some(url)
    }

    fn retry_after_secs(response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
    }

    async fn interpret(response: reqwest::Response, order_number: &str) -> FetchResult {
        match response.status() {
            StatusCode::OK => {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => return FetchResult::TransientError(format!("failed to read body: {}", e)),
                };

                match serde_json::from_str::<AccrualResponse>(&body) {
                    Ok(parsed) => {
                        if parsed.order != order_number {
                            warn!(
                                "Reward service answered for order {} while {} was requested",
                                parsed.order, order_number
                            );
                        }
                        FetchResult::Success {
                            status: parsed.status,
                            amount: parsed.accrual,
                        }
                    }
                    Err(e) => FetchResult::TransientError(format!("malformed body: {}", e)),
                }
            }
            StatusCode::NO_CONTENT => FetchResult::NotRegistered,
            StatusCode::TOO_MANY_REQUESTS => FetchResult::RateLimited {
                retry_after_secs: Self::retry_after_secs(&response),
            },
            other => FetchResult::ClientError(other.as_u16()),
        }
    }
}

#[async_trait]
impl RewardClient for HttpRewardClient {
    async fn fetch(&self, order_number: &str, cancel: &CancellationToken) -> FetchResult {
        let Some(url) = self.order_url(order_number) else {
            return FetchResult::TransientError(format!("cannot build URL for order {}", order_number));
        };

        debug!("GET {}", url);

        let call = async {
            match self.client.get(url).send().await {
                Ok(response) => Self::interpret(response, order_number).await,
                Err(e) if e.is_timeout() => FetchResult::TransientError("request timed out".to_string()),
                Err(e) => FetchResult::TransientError(format!("request failed: {}", e)),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => FetchResult::TransientError("cancelled".to_string()),
            result = call => result,
        }
    }
}
