//! Harvest the addon registry into a catalog of JSON lines.
use envconfig::Envconfig;
use eyre::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use catalog_crawler::config::Config;
use catalog_crawler::harvest::Harvester;
use catalog_crawler::sink::{CatalogSink, JsonLinesSink, PrintSink};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the records when no OUTPUT_PATH is set.
    let log_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry().with(log_layer).init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let harvester = Harvester::over_http(&config)?;

    let sink: Box<dyn CatalogSink> = match &config.output_path {
        Some(path) => Box::new(JsonLinesSink::create(path.as_str()).await?),
        None => Box::new(PrintSink {}),
    };

    let summary = harvester.run(sink.as_ref()).await?;

    info!(
        page_count = summary.page_count,
        records_stored = summary.crawl.records_stored,
        pages_dropped = summary.crawl.dropped_pages.len(),
        dates_stored = summary.enrichment.dates_stored,
        catalog_records = summary.catalog.built,
        catalog_failures = summary.catalog.failures.len(),
        "harvest complete"
    );

    Ok(())
}
