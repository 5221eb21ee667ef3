use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::client::{FetchResult, RewardClient};

/// Reward client answering from a fixed per-order script.
///
/// Unknown orders get a 404-style `ClientError`. Tracks the peak number of
/// concurrent calls so tests can check the worker-pool bound.
pub struct ScriptedRewardClient {
    script: Mutex<HashMap<String, FetchResult>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedRewardClient {
    pub fn new(script: Vec<(&str, FetchResult)>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(number, result)| (number.to_string(), result))
                    .collect(),
            ),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, number: &str, result: FetchResult) {
        self.script.lock().insert(number.to_string(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewardClient for ScriptedRewardClient {
    async fn fetch(&self, order_number: &str, cancel: &CancellationToken) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let cancelled = if self.delay.is_zero() {
            false
        } else {
            tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(self.delay) => false,
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if cancelled {
            return FetchResult::TransientError("cancelled".to_string());
        }

        self.script
            .lock()
            .get(order_number)
            .cloned()
            .unwrap_or(FetchResult::ClientError(404))
    }
}
