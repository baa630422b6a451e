use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::{ScalarKind, Schema, TypeDescriptor};

pub static ADDON_FILE_SCHEMA: Lazy<Arc<Schema>> = Lazy::new(|| {
    Schema::build("AddonFile")
        .field("id", TypeDescriptor::integer())
        .field("platform", TypeDescriptor::string())
        .field("status", TypeDescriptor::string())
        .field("is_webextension", TypeDescriptor::boolean())
        .provide()
});

pub static ADDON_VERSION_SCHEMA: Lazy<Arc<Schema>> = Lazy::new(|| {
    Schema::build("AddonVersion")
        .field(
            "files",
            TypeDescriptor::sequence_of(TypeDescriptor::schema(&ADDON_FILE_SCHEMA)),
        )
        .provide()
});

pub static ADDON_SCHEMA: Lazy<Arc<Schema>> = Lazy::new(|| {
    let localized = || TypeDescriptor::mapping_of(ScalarKind::String, TypeDescriptor::string());

    Schema::build("AddonRecord")
        .field("guid", TypeDescriptor::string())
        .field(
            "categories",
            TypeDescriptor::mapping_of(
                ScalarKind::String,
                TypeDescriptor::sequence_of(TypeDescriptor::string()),
            ),
        )
        .field("default_locale", TypeDescriptor::string())
        .field("description", localized())
        .field("name", localized())
        .field(
            "current_version",
            TypeDescriptor::schema(&ADDON_VERSION_SCHEMA),
        )
        .field(
            "ratings",
            TypeDescriptor::mapping_of(ScalarKind::String, TypeDescriptor::float()),
        )
        .field("summary", localized())
        .field("tags", TypeDescriptor::sequence_of(TypeDescriptor::string()))
        .field("weekly_downloads", TypeDescriptor::integer())
        .provide()
});

/// A field that may be absent (`None`), present but null (`Some(None)`) or set.
pub type Nullable<T> = Option<Option<T>>;

/// Turn a present field into `Some`, so that a JSON null reads as `Some(None)`.
/// Pair with `#[serde(default)]` so an absent field stays `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Nullable<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_webextension: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonVersion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<AddonFile>>,
}

/// An addon as read from the search API, after coercion through `ADDON_SCHEMA`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub categories: Nullable<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_locale: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Nullable<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Nullable<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<AddonVersion>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub ratings: Nullable<BTreeMap<String, f64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub summary: Nullable<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_downloads: Option<i64>,
}

/// Creation date of the earliest version found on an addon's last version page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDateRecord {
    pub guid: String,
    pub create_date: String,
}

/// The final catalog entry: an `AddonRecord` joined with its enrichment date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAddonRecord {
    #[serde(flatten)]
    pub addon: AddonRecord,
    pub first_create_date: String,
}

impl EnrichedAddonRecord {
    pub fn guid(&self) -> Option<&str> {
        self.addon.guid.as_deref()
    }
}
