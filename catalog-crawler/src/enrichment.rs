use catalog_common::addon::VersionDateRecord;
use catalog_common::store::RawRecordStore;
use tracing::{info, instrument, warn};
use url::Url;

use crate::crawl::SkippedItem;
use crate::error::{PayloadError, SkipReason};
use crate::payload;
use crate::pool::{FetchFailure, FetchPool};

/// What happened during `run_version_enrichment`.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub addons_requested: usize,
    pub listings_fetched: usize,
    pub last_pages_fetched: usize,
    /// Requests that failed in either phase, after the retry round when one is configured.
    pub dropped: Vec<FetchFailure>,
    pub skipped: Vec<SkippedItem>,
    pub dates_stored: usize,
}

/// Looks up, for every addon, the creation date of the earliest version on its last
/// version page and stores it as a `VersionDateRecord`.
pub struct EnrichmentPipeline {
    pool: FetchPool,
    dates: RawRecordStore,
    addons_uri: Url,
    retry_failures: bool,
}

impl EnrichmentPipeline {
    pub fn new(pool: FetchPool, dates: RawRecordStore, addons_uri: Url) -> Self {
        Self {
            pool,
            dates,
            addons_uri,
            retry_failures: false,
        }
    }

    /// Give each phase a single retry round, like the search crawl.
    pub fn retry_failures(mut self, retry_failures: bool) -> Self {
        self.retry_failures = retry_failures;
        self
    }

    /// Never fails: every skipped guid is logged and reported.
    #[instrument(skip_all, fields(addons = guids.len()))]
    pub async fn run_version_enrichment(&self, guids: &[String]) -> EnrichmentReport {
        let mut report = EnrichmentReport {
            addons_requested: guids.len(),
            ..Default::default()
        };

        let mut listing_urls = Vec::with_capacity(guids.len());
        for guid in guids {
            match payload::versions_url(&self.addons_uri, guid) {
                Some(url) => listing_urls.push(url.to_string()),
                None => self.skip(
                    &mut report,
                    self.addons_uri.to_string(),
                    PayloadError::GuidNotInUrl(guid.clone()).into(),
                ),
            }
        }

        let listings = self
            .pool
            .fetch_all_with_retry(listing_urls, "versions", self.retry_failures)
            .await;
        report.listings_fetched = listings.successes.len();
        self.log_dropped(&listings.failures);
        report.dropped.extend(listings.failures);

        let mut last_page_urls = Vec::with_capacity(listings.successes.len());
        for response in &listings.successes {
            match last_page_url(&response.url, &response.body) {
                Ok(url) => last_page_urls.push(url.to_string()),
                Err(error) => self.skip(&mut report, response.url.clone(), error.into()),
            }
        }

        let last_pages = self
            .pool
            .fetch_all_with_retry(last_page_urls, "versions_last_page", self.retry_failures)
            .await;
        report.last_pages_fetched = last_pages.successes.len();
        self.log_dropped(&last_pages.failures);
        report.dropped.extend(last_pages.failures);

        for response in &last_pages.successes {
            let date = payload::parse_body(response).and_then(|mut page| {
                Ok(VersionDateRecord {
                    guid: payload::guid_from_versions_url(&response.url)?,
                    create_date: payload::last_version_created(&mut page)?,
                })
            });

            let stored = match date {
                Ok(date) => self.store_date(&date).await,
                Err(error) => Err(error.into()),
            };
            match stored {
                Ok(()) => report.dates_stored += 1,
                Err(reason) => self.skip(&mut report, response.url.clone(), reason),
            }
        }

        info!(
            addons_requested = report.addons_requested,
            listings_fetched = report.listings_fetched,
            last_pages_fetched = report.last_pages_fetched,
            dropped = report.dropped.len(),
            skipped = report.skipped.len(),
            dates_stored = report.dates_stored,
            "version enrichment complete"
        );

        report
    }

    async fn store_date(&self, date: &VersionDateRecord) -> Result<(), SkipReason> {
        let document = serde_json::to_value(date).map_err(PayloadError::Json)?;
        self.dates.put(&date.guid, &document).await?;
        metrics::counter!("catalog_dates_stored_total").increment(1);

        Ok(())
    }

    fn skip(&self, report: &mut EnrichmentReport, url: String, reason: SkipReason) {
        warn!("skipping version enrichment for {}: {}", url, reason);
        report.skipped.push(SkippedItem {
            url,
            position: None,
            reason,
        });
    }

    fn log_dropped(&self, failures: &[FetchFailure]) {
        for failure in failures {
            warn!("dropping version request: {}", failure.error);
        }
    }
}

/// Read `page_count` from a version listing and point its URL at that last page.
fn last_page_url(listing_url: &str, body: &[u8]) -> Result<Url, PayloadError> {
    let listing: serde_json::Value = serde_json::from_slice(body)?;
    let page_count = payload::page_count(&listing)?;
    if page_count == 0 {
        return Err(PayloadError::MissingKey("results[-1]"));
    }

    let url = Url::parse(listing_url).map_err(|_| PayloadError::GuidNotInUrl(listing_url.to_owned()))?;
    Ok(payload::with_page(&url, page_count))
}
