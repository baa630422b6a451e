use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::transport::{FetchResponse, Transport};

/// A URL that could not be fetched with a 200 status.
#[derive(Debug)]
pub struct FetchFailure {
    /// The URL as it was requested, so it can be dispatched again.
    pub url: String,
    pub error: FetchError,
}

/// Completions of a single round of fetches, partitioned by outcome.
#[derive(Debug, Default)]
pub struct FetchRound {
    pub successes: Vec<FetchResponse>,
    pub failures: Vec<FetchFailure>,
    /// How many of `successes` only succeeded on the retry round.
    pub recovered: usize,
}

impl FetchRound {
    pub fn failed_urls(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|failure| failure.url.clone())
            .collect()
    }
}

/// Dispatches GET requests on Tokio tasks, never more than `max_concurrency` in flight.
#[derive(Clone)]
pub struct FetchPool {
    transport: Arc<dyn Transport>,
    max_concurrency: usize,
}

impl FetchPool {
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            transport,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Fetch every URL and wait for all of them to complete or fail.
    ///
    /// Completion order is not preserved. Anything but a 200 response is a failure.
    pub async fn fetch_all(&self, urls: Vec<String>, phase: &'static str) -> FetchRound {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut round = FetchRound::default();
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(error) => {
                    round.failures.push(FetchFailure {
                        error: FetchError::Task {
                            url: url.clone(),
                            reason: error.to_string(),
                        },
                        url,
                    });
                    continue;
                }
            };

            metrics::gauge!("catalog_fetch_pool_saturation_percent", "phase" => phase).set(
                1f64 - semaphore.available_permits() as f64 / self.max_concurrency as f64,
            );

            let transport = self.transport.clone();
            let task_url = url.clone();
            let handle = tokio::spawn(async move {
                let result = transport.get(&task_url).await;
                drop(permit);
                result
            });
            handles.push((url, handle));
        }

        for (url, handle) in handles {
            let error = match handle.await {
                Ok(Ok(response)) if response.is_ok() => {
                    round.successes.push(response);
                    continue;
                }
                Ok(Ok(response)) => FetchError::UnexpectedStatus {
                    url: url.clone(),
                    status: response.status,
                },
                Ok(Err(error)) => error,
                Err(join_error) => FetchError::Task {
                    url: url.clone(),
                    reason: join_error.to_string(),
                },
            };
            round.failures.push(FetchFailure { url, error });
        }

        metrics::counter!("catalog_pages_fetched_total", "phase" => phase)
            .increment(round.successes.len() as u64);
        metrics::counter!("catalog_pages_failed_total", "phase" => phase)
            .increment(round.failures.len() as u64);
        debug!(
            phase,
            successes = round.successes.len(),
            failures = round.failures.len(),
            "fetch round complete"
        );

        round
    }

    /// Fetch every URL, then, if `retry` is set, dispatch the failed ones exactly once more.
    /// Successes of both rounds are merged; failures are those left after the last round.
    pub async fn fetch_all_with_retry(
        &self,
        urls: Vec<String>,
        phase: &'static str,
        retry: bool,
    ) -> FetchRound {
        let mut first = self.fetch_all(urls, phase).await;
        if !retry || first.failures.is_empty() {
            return first;
        }

        for failure in &first.failures {
            warn!(phase, "retrying failed fetch: {}", failure.error);
        }
        let second = self.fetch_all(first.failed_urls(), phase).await;

        first.recovered = second.successes.len();
        first.successes.extend(second.successes);
        first.failures = second.failures;
        first
    }
}
