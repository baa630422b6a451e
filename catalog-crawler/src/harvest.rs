//! End-to-end run: crawl the search API, enrich every stored addon and export the catalog.
use std::sync::Arc;

use catalog_common::store::RawRecordStore;
use tracing::info;
use url::Url;

use crate::catalog::{CatalogBuilder, CatalogSummary, MissingDatePolicy};
use crate::config::Config;
use crate::crawl::{CrawlPipeline, CrawlReport};
use crate::enrichment::{EnrichmentPipeline, EnrichmentReport};
use crate::error::HarvestError;
use crate::pool::FetchPool;
use crate::sink::CatalogSink;
use crate::transport::{HttpTransport, Transport};

#[derive(Debug)]
pub struct HarvestSummary {
    pub page_count: u64,
    pub crawl: CrawlReport,
    pub enrichment: EnrichmentReport,
    pub catalog: CatalogSummary,
}

pub struct Harvester {
    search_uri: Url,
    search_query: String,
    addons: RawRecordStore,
    dates: RawRecordStore,
    crawl: CrawlPipeline,
    enrichment: EnrichmentPipeline,
    missing_date_policy: MissingDatePolicy,
    drop_invalid_fields: bool,
}

impl Harvester {
    /// Build a harvester that talks to the registry over HTTP.
    pub fn over_http(config: &Config) -> Result<Self, HarvestError> {
        let transport = HttpTransport::new(config.request_timeout.0, &config.user_agent)?;
        Self::from_config(config, Arc::new(transport))
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, HarvestError> {
        let search_uri = parse_uri("SEARCH_URI", config.search_uri.as_str())?;
        let addons_uri = parse_uri("ADDONS_URI", config.addons_uri.as_str())?;
        let addons = RawRecordStore::new(config.addon_cache_dir.as_str());
        let dates = RawRecordStore::new(config.dates_cache_dir.as_str());
        let pool = FetchPool::new(transport, config.max_concurrent_requests);

        Ok(Self {
            search_uri,
            search_query: config.search_query.clone(),
            crawl: CrawlPipeline::new(pool.clone(), addons.clone()),
            enrichment: EnrichmentPipeline::new(pool, dates.clone(), addons_uri)
                .retry_failures(config.retry_enrichment),
            addons,
            dates,
            missing_date_policy: config.missing_date_policy,
            drop_invalid_fields: config.drop_invalid_fields,
        })
    }

    /// Start from empty stores, then crawl, enrich and hand every catalog record to `sink`.
    pub async fn run(&self, sink: &dyn CatalogSink) -> Result<HarvestSummary, HarvestError> {
        self.addons.reset().await?;
        self.dates.reset().await?;

        let page_count = self
            .crawl
            .discover_page_count(&self.search_uri, &self.search_query)
            .await?;
        info!(page_count, "discovered search pages");

        let crawl = self
            .crawl
            .run_paged_crawl(&self.search_uri, &self.search_query, page_count)
            .await;

        let guids = self.addons.list_keys().await?;
        let enrichment = self.enrichment.run_version_enrichment(&guids).await;

        let catalog = CatalogBuilder::new(self.addons.clone(), self.dates.clone())
            .drop_invalid_fields(self.drop_invalid_fields)
            .export(sink, self.missing_date_policy)
            .await?;

        Ok(HarvestSummary {
            page_count,
            crawl,
            enrichment,
            catalog,
        })
    }
}

fn parse_uri(name: &'static str, value: &str) -> Result<Url, HarvestError> {
    let url = Url::parse(value).map_err(|error| HarvestError::InvalidUri {
        name,
        reason: error.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(HarvestError::InvalidUri {
            name,
            reason: "cannot be a base".to_owned(),
        });
    }

    Ok(url)
}
