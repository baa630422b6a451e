use catalog_common::store::RawRecordStore;
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::{DiscoveryError, FetchError, PayloadError, SkipReason};
use crate::payload;
use crate::pool::{FetchFailure, FetchPool};
use crate::transport::FetchResponse;

/// A page that came back with a 200 but could not be read.
#[derive(Debug)]
pub struct MalformedPage {
    pub url: String,
    pub error: PayloadError,
}

/// An item of a page that was not stored.
#[derive(Debug)]
pub struct SkippedItem {
    pub url: String,
    /// Position of the item in the page's `results`, when the item came from one.
    pub position: Option<usize>,
    pub reason: SkipReason,
}

/// What happened during `run_paged_crawl`, so skipped work is visible without reading logs.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub pages_requested: usize,
    /// Pages that succeeded on the first round.
    pub pages_fetched: usize,
    /// Pages that failed on the first round and succeeded on the retry round.
    pub pages_recovered: usize,
    /// Pages that failed both rounds.
    pub dropped_pages: Vec<FetchFailure>,
    pub malformed_pages: Vec<MalformedPage>,
    /// Number of writes. Exceeds the number of stored keys when pages overlap.
    pub records_stored: usize,
    pub skipped_records: Vec<SkippedItem>,
}

/// Generate the URL of every search page, `page=1` through `page=page_count`.
pub fn page_urls(base_uri: &Url, query: &str, page_count: u64) -> Vec<String> {
    let search = search_url(base_uri, query);

    (1..=page_count)
        .map(|page| {
            let mut url = search.clone();
            url.query_pairs_mut().append_pair("page", &page.to_string());
            url.to_string()
        })
        .collect()
}

fn search_url(base_uri: &Url, query: &str) -> Url {
    let mut url = base_uri.clone();
    if !query.is_empty() {
        url.set_query(Some(query));
    }
    url
}

/// Crawls the paginated search API into a `RawRecordStore`, one document per guid.
pub struct CrawlPipeline {
    pool: FetchPool,
    store: RawRecordStore,
}

impl CrawlPipeline {
    pub fn new(pool: FetchPool, store: RawRecordStore) -> Self {
        Self { pool, store }
    }

    /// Request the first search page to learn how many pages there are.
    pub async fn discover_page_count(
        &self,
        base_uri: &Url,
        query: &str,
    ) -> Result<u64, DiscoveryError> {
        let url = search_url(base_uri, query).to_string();
        let round = self.pool.fetch_all(vec![url.clone()], "discover").await;

        if let Some(failure) = round.failures.into_iter().next() {
            return Err(DiscoveryError::Fetch(failure.error));
        }
        let response = round
            .successes
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Task {
                url: url.clone(),
                reason: "no response was produced".to_owned(),
            })?;

        payload::parse_body(&response)
            .and_then(|page| payload::page_count(&page))
            .map_err(|error| DiscoveryError::Payload { url, error })
    }

    /// Fetch every search page, retry the failed ones once, and store every record by guid.
    ///
    /// Never fails: pages that fail twice, malformed pages and malformed records are logged
    /// and reported.
    #[instrument(skip_all, fields(page_count = page_count))]
    pub async fn run_paged_crawl(&self, base_uri: &Url, query: &str, page_count: u64) -> CrawlReport {
        let urls = page_urls(base_uri, query, page_count);
        let mut report = CrawlReport {
            pages_requested: urls.len(),
            ..Default::default()
        };

        let round = self.pool.fetch_all_with_retry(urls, "crawl", true).await;
        report.pages_recovered = round.recovered;
        report.pages_fetched = round.successes.len() - round.recovered;
        self.store_pages(&round.successes, &mut report).await;

        for failure in &round.failures {
            warn!("dropping search page after retry: {}", failure.error);
        }
        report.dropped_pages = round.failures;

        info!(
            pages_requested = report.pages_requested,
            pages_fetched = report.pages_fetched,
            pages_recovered = report.pages_recovered,
            pages_dropped = report.dropped_pages.len(),
            records_stored = report.records_stored,
            records_skipped = report.skipped_records.len(),
            "crawl complete"
        );

        report
    }

    async fn store_pages(&self, responses: &[FetchResponse], report: &mut CrawlReport) {
        for response in responses {
            let results = payload::parse_body(response)
                .and_then(|mut page| payload::take_results(&mut page));

            let results = match results {
                Ok(results) => results,
                Err(error) => {
                    warn!("skipping malformed page {}: {}", response.url, error);
                    report.malformed_pages.push(MalformedPage {
                        url: response.url.clone(),
                        error,
                    });
                    continue;
                }
            };

            for (position, record) in results.iter().enumerate() {
                match self.store_record(record).await {
                    Ok(()) => report.records_stored += 1,
                    Err(reason) => {
                        warn!(
                            "skipping record {} of page {}: {}",
                            position, response.url, reason
                        );
                        metrics::counter!("catalog_records_skipped_total").increment(1);
                        report.skipped_records.push(SkippedItem {
                            url: response.url.clone(),
                            position: Some(position),
                            reason,
                        });
                    }
                }
            }
        }
    }

    async fn store_record(&self, record: &serde_json::Value) -> Result<(), SkipReason> {
        let guid = payload::record_guid(record).ok_or(SkipReason::MissingGuid)?;
        self.store.put(guid, record).await?;
        metrics::counter!("catalog_records_stored_total").increment(1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockReply, MockTransport};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    const BASE: &str = "http://api.test/addons/search/";
    const QUERY: &str = "app=firefox&sort=created&type=extension";

    fn page_url(page: u64) -> String {
        format!("{BASE}?{QUERY}&page={page}")
    }

    fn page_body(guids: &[&str]) -> String {
        let results: Vec<_> = guids
            .iter()
            .map(|guid| json!({"guid": guid, "weekly_downloads": 1}))
            .collect();
        json!({"page_count": 9, "results": results}).to_string()
    }

    async fn setup_pipeline(transport: &MockTransport) -> (TempDir, RawRecordStore, CrawlPipeline) {
        let temp_dir = TempDir::new().unwrap();
        let store = RawRecordStore::new(temp_dir.path().join("addons"));
        store.reset().await.unwrap();
        let pool = FetchPool::new(Arc::new(transport.clone()), 4);

        (temp_dir, store.clone(), CrawlPipeline::new(pool, store))
    }

    #[test]
    fn test_page_urls() {
        let base = Url::parse(BASE).unwrap();

        assert_eq!(page_urls(&base, QUERY, 3), vec![page_url(1), page_url(2), page_url(3)]);
        assert!(page_urls(&base, QUERY, 0).is_empty());
        assert_eq!(
            page_urls(&base, "", 1),
            vec!["http://api.test/addons/search/?page=1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_discover_page_count() {
        let transport = MockTransport::new().route(
            &format!("{BASE}?{QUERY}"),
            vec![MockReply::json(200, r#"{"page_count": 42, "results": []}"#)],
        );
        let (_temp_dir, _store, pipeline) = setup_pipeline(&transport).await;

        let count = pipeline
            .discover_page_count(&Url::parse(BASE).unwrap(), QUERY)
            .await
            .unwrap();

        assert_eq!(count, 42);
    }

    #[tokio::test]
    async fn test_discover_page_count_failures() {
        let transport = MockTransport::new()
            .route(&format!("{BASE}?{QUERY}"), vec![MockReply::status(502)])
            .route(&format!("{BASE}?bad"), vec![MockReply::json(200, "[]")]);
        let (_temp_dir, _store, pipeline) = setup_pipeline(&transport).await;
        let base = Url::parse(BASE).unwrap();

        assert!(matches!(
            pipeline.discover_page_count(&base, QUERY).await,
            Err(DiscoveryError::Fetch(FetchError::UnexpectedStatus { status: 502, .. }))
        ));
        assert!(matches!(
            pipeline.discover_page_count(&base, "bad").await,
            Err(DiscoveryError::Payload { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_round_recovers_pages_failing_once() {
        let page_count = 9;
        let mut transport = MockTransport::new();
        for page in 1..=page_count {
            let guids = [format!("guid-{page}-a"), format!("guid-{page}-b")];
            let body = page_body(&[guids[0].as_str(), guids[1].as_str()]);
            let replies = if page % 3 == 0 {
                vec![MockReply::Timeout, MockReply::json(200, body)]
            } else {
                vec![MockReply::json(200, body)]
            };
            transport = transport.route(&page_url(page), replies);
        }
        let (_temp_dir, store, pipeline) = setup_pipeline(&transport).await;

        let report = pipeline
            .run_paged_crawl(&Url::parse(BASE).unwrap(), QUERY, page_count)
            .await;

        assert_eq!(report.pages_requested, 9);
        assert_eq!(report.pages_fetched, 6);
        assert_eq!(report.pages_recovered, 3);
        assert!(report.dropped_pages.is_empty());
        assert_eq!(report.records_stored, 18);
        assert_eq!(store.list_keys().await.unwrap().len(), 18);
        assert_eq!(transport.hits(&page_url(3)), 2);
        assert_eq!(transport.hits(&page_url(4)), 1);
    }

    #[tokio::test]
    async fn test_page_failing_twice_is_dropped() {
        let transport = MockTransport::new()
            .route(&page_url(1), vec![MockReply::json(200, page_body(&["a"]))])
            .route(
                &page_url(2),
                vec![MockReply::status(500), MockReply::status(503)],
            );
        let (_temp_dir, store, pipeline) = setup_pipeline(&transport).await;

        let report = pipeline
            .run_paged_crawl(&Url::parse(BASE).unwrap(), QUERY, 2)
            .await;

        assert_eq!(store.list_keys().await.unwrap(), vec!["a".to_string()]);
        assert_eq!(report.dropped_pages.len(), 1);
        assert_eq!(report.dropped_pages[0].url, page_url(2));
        assert!(matches!(
            report.dropped_pages[0].error,
            FetchError::UnexpectedStatus { status: 503, .. }
        ));
        assert_eq!(transport.hits(&page_url(2)), 2);
    }

    #[tokio::test]
    async fn test_bad_records_do_not_fail_their_page() {
        let body = json!({
            "page_count": 1,
            "results": [
                {"guid": "good", "weekly_downloads": 3},
                {"name": {"en-US": "no guid"}},
                {"guid": 17},
                {"guid": "../escape"},
                {"guid": "also-good"}
            ]
        })
        .to_string();
        let transport = MockTransport::new().route(&page_url(1), vec![MockReply::json(200, body)]);
        let (_temp_dir, store, pipeline) = setup_pipeline(&transport).await;

        let report = pipeline
            .run_paged_crawl(&Url::parse(BASE).unwrap(), QUERY, 1)
            .await;

        assert_eq!(
            store.list_keys().await.unwrap(),
            vec!["also-good".to_string(), "good".to_string()]
        );
        assert_eq!(
            store.get("good").await.unwrap(),
            json!({"guid": "good", "weekly_downloads": 3})
        );
        assert_eq!(report.records_stored, 2);
        let positions: Vec<_> = report
            .skipped_records
            .iter()
            .map(|skipped| skipped.position)
            .collect();
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);
        assert!(matches!(
            report.skipped_records[0].reason,
            SkipReason::MissingGuid
        ));
        assert!(matches!(report.skipped_records[2].reason, SkipReason::Store(_)));
    }

    #[tokio::test]
    async fn test_malformed_page_is_skipped_without_retry() {
        let transport = MockTransport::new()
            .route(&page_url(1), vec![MockReply::json(200, "<html>oops</html>")])
            .route(&page_url(2), vec![MockReply::json(200, r#"{"page_count": 2}"#)])
            .route(&page_url(3), vec![MockReply::json(200, page_body(&["c"]))]);
        let (_temp_dir, store, pipeline) = setup_pipeline(&transport).await;

        let report = pipeline
            .run_paged_crawl(&Url::parse(BASE).unwrap(), QUERY, 3)
            .await;

        assert_eq!(store.list_keys().await.unwrap(), vec!["c".to_string()]);
        assert_eq!(report.malformed_pages.len(), 2);
        assert!(report
            .malformed_pages
            .iter()
            .any(|page| matches!(page.error, PayloadError::MissingKey("results"))));
        assert_eq!(transport.hits(&page_url(1)), 1);
    }

    #[tokio::test]
    async fn test_overlapping_pages_last_write_wins() {
        let transport = MockTransport::new()
            .route(&page_url(1), vec![MockReply::json(200, page_body(&["a", "b"]))])
            .route(&page_url(2), vec![MockReply::json(200, page_body(&["b", "c"]))]);
        let (_temp_dir, store, pipeline) = setup_pipeline(&transport).await;

        let report = pipeline
            .run_paged_crawl(&Url::parse(BASE).unwrap(), QUERY, 2)
            .await;

        assert_eq!(report.records_stored, 4);
        assert_eq!(store.list_keys().await.unwrap().len(), 3);
    }
}
