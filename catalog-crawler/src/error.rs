use catalog_common::marshal::CoercionError;
use catalog_common::store::StoreError;
use thiserror::Error;

/// Enumeration of errors that can occur as a request is sent through a `Transport`.
/// All of them count as a failed fetch, eligible for a retry round.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed with: {error}")]
    Request { url: String, error: reqwest::Error },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} responded with unexpected status {status}")]
    UnexpectedStatus { url: String, status: u16 },
    #[error("fetch task for {url} did not complete: {reason}")]
    Task { url: String, reason: String },
}

/// Enumeration of errors raised while reading a successful response body.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response is missing {0}")]
    MissingKey(&'static str),
    #[error("{key} should be {expected}")]
    UnexpectedShape {
        key: &'static str,
        expected: &'static str,
    },
    #[error("could not find an addon guid in {0}")]
    GuidNotInUrl(String),
}

/// Why a single page item was not written to a store.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("record has no string guid")]
    MissingGuid,
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors while discovering how many search pages there are.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("page count could not be read from {url}: {error}")]
    Payload { url: String, error: PayloadError },
}

/// Enumeration of errors for a single record of the catalog pass, or for a sink.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no enrichment date was stored for {0}")]
    MissingDate(String),
    #[error("record {guid} failed coercion: {error}")]
    Coercion { guid: String, error: CoercionError },
    #[error("record {guid} could not be decoded: {error}")]
    Decode {
        guid: String,
        error: serde_json::Error,
    },
    #[error("failed to hand records to the sink: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that stop a whole harvest run.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("{name} is not a valid base uri: {reason}")]
    InvalidUri { name: &'static str, reason: String },
    #[error("failed to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
