use std::str::FromStr;

use catalog_common::addon::{AddonRecord, EnrichedAddonRecord, VersionDateRecord, ADDON_SCHEMA};
use catalog_common::marshal::{marshal, marshal_partial};
use catalog_common::store::{RawRecordStore, StoreError};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::sink::CatalogSink;

const PROGRESS_INTERVAL: usize = 200;

/// What to do with an addon that has no enrichment date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDatePolicy {
    /// Log and leave the addon out of the catalog.
    Skip,
    /// Stop the catalog pass with `CatalogError::MissingDate`.
    Abort,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseMissingDatePolicyError(pub String);

impl FromStr for MissingDatePolicy {
    type Err = ParseMissingDatePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "skip" => Ok(MissingDatePolicy::Skip),
            "abort" => Ok(MissingDatePolicy::Abort),
            invalid => Err(ParseMissingDatePolicyError(invalid.to_owned())),
        }
    }
}

/// Outcome of `CatalogBuilder::export`.
#[derive(Debug, Default)]
pub struct CatalogSummary {
    pub built: usize,
    pub failures: Vec<CatalogError>,
}

/// Joins the cached addon documents with their enrichment dates into `EnrichedAddonRecord`s.
pub struct CatalogBuilder {
    addons: RawRecordStore,
    dates: RawRecordStore,
    drop_invalid_fields: bool,
}

impl CatalogBuilder {
    pub fn new(addons: RawRecordStore, dates: RawRecordStore) -> Self {
        Self {
            addons,
            dates,
            drop_invalid_fields: false,
        }
    }

    /// Drop fields that fail coercion instead of the whole record.
    pub fn drop_invalid_fields(mut self, drop_invalid_fields: bool) -> Self {
        self.drop_invalid_fields = drop_invalid_fields;
        self
    }

    /// Lazily build one record per key of the addon store.
    ///
    /// Keys are listed up front; each record is read and marshalled only when polled.
    /// Calling `build` again starts over from the current store contents.
    pub async fn build(
        &self,
    ) -> Result<impl Stream<Item = Result<EnrichedAddonRecord, CatalogError>> + '_, StoreError>
    {
        let keys = self.addons.list_keys().await?;

        Ok(futures::stream::iter(keys).then(move |guid| async move {
            let result = self.build_record(&guid).await;
            if result.is_ok() {
                metrics::counter!("catalog_records_built_total").increment(1);
            }
            result
        }))
    }

    /// Build a single catalog record.
    pub async fn build_record(&self, guid: &str) -> Result<EnrichedAddonRecord, CatalogError> {
        let raw = self.addons.get(guid).await?;
        let mut addon = self.marshal_addon(guid, &raw)?;
        if addon.guid.is_none() {
            addon.guid = Some(guid.to_owned());
        }

        let date = match self.dates.get(guid).await {
            Ok(date) => date,
            Err(StoreError::NotFound(_)) => return Err(CatalogError::MissingDate(guid.to_owned())),
            Err(error) => return Err(error.into()),
        };
        let date: VersionDateRecord =
            serde_json::from_value(date).map_err(|error| CatalogError::Decode {
                guid: guid.to_owned(),
                error,
            })?;

        Ok(EnrichedAddonRecord {
            addon,
            first_create_date: date.create_date,
        })
    }

    fn marshal_addon(&self, guid: &str, raw: &Value) -> Result<AddonRecord, CatalogError> {
        let coercion_error = |error| CatalogError::Coercion {
            guid: guid.to_owned(),
            error,
        };

        let record = if self.drop_invalid_fields {
            let partial = marshal_partial(&ADDON_SCHEMA, raw).map_err(coercion_error)?;
            for failure in &partial.failures {
                warn!("dropping field of {}: {}", guid, failure);
            }
            partial.record
        } else {
            marshal(&ADDON_SCHEMA, raw).map_err(coercion_error)?
        };

        serde_json::from_value(record.to_json()).map_err(|error| CatalogError::Decode {
            guid: guid.to_owned(),
            error,
        })
    }

    /// Build every record and hand it to `sink`.
    ///
    /// Records that fail to build are logged and collected in the summary. A missing date
    /// stops the pass under `MissingDatePolicy::Abort`, as does any sink error.
    pub async fn export(
        &self,
        sink: &dyn CatalogSink,
        policy: MissingDatePolicy,
    ) -> Result<CatalogSummary, CatalogError> {
        let mut summary = CatalogSummary::default();
        let records = self.build().await?;
        futures::pin_mut!(records);

        let mut seen = 0;
        while let Some(result) = records.next().await {
            seen += 1;
            if seen % PROGRESS_INTERVAL == 0 {
                info!(seen, built = summary.built, "catalog pass in progress");
            }

            match result {
                Ok(record) => {
                    sink.send(&record).await?;
                    summary.built += 1;
                }
                Err(CatalogError::MissingDate(guid)) if policy == MissingDatePolicy::Abort => {
                    return Err(CatalogError::MissingDate(guid));
                }
                Err(error) => {
                    warn!("leaving record out of the catalog: {}", error);
                    summary.failures.push(error);
                }
            }
        }
        sink.flush().await?;

        info!(
            built = summary.built,
            failed = summary.failures.len(),
            "catalog pass complete"
        );

        Ok(summary)
    }
}
