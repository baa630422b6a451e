//! Readers for the paginated `{page_count, results}` envelope the registry API responds with.
use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::Url;

use crate::error::PayloadError;
use crate::transport::FetchResponse;

/// Parse a response body as JSON.
pub fn parse_body(response: &FetchResponse) -> Result<Value, PayloadError> {
    Ok(serde_json::from_slice(&response.body)?)
}

/// Read `page_count` from a page envelope.
pub fn page_count(page: &Value) -> Result<u64, PayloadError> {
    match page.get("page_count") {
        Some(count) => count.as_u64().ok_or(PayloadError::UnexpectedShape {
            key: "page_count",
            expected: "a non-negative integer",
        }),
        None => Err(PayloadError::MissingKey("page_count")),
    }
}

/// Take the `results` array out of a page envelope.
pub fn take_results(page: &mut Value) -> Result<Vec<Value>, PayloadError> {
    match page.get_mut("results").map(Value::take) {
        Some(Value::Array(results)) => Ok(results),
        Some(_) => Err(PayloadError::UnexpectedShape {
            key: "results",
            expected: "an array",
        }),
        None => Err(PayloadError::MissingKey("results")),
    }
}

pub fn record_guid(record: &Value) -> Option<&str> {
    record.get("guid").and_then(Value::as_str)
}

/// The `created` timestamp of the first file of the last version in a versions page.
pub fn last_version_created(page: &mut Value) -> Result<String, PayloadError> {
    let results = take_results(page)?;
    let last = results
        .last()
        .ok_or(PayloadError::MissingKey("results[-1]"))?;
    let first_file = last
        .get("files")
        .and_then(Value::as_array)
        .and_then(|files| files.first())
        .ok_or(PayloadError::MissingKey("results[-1].files[0]"))?;

    match first_file.get("created") {
        Some(Value::String(created)) => Ok(created.clone()),
        Some(_) => Err(PayloadError::UnexpectedShape {
            key: "results[-1].files[0].created",
            expected: "a string",
        }),
        None => Err(PayloadError::MissingKey("results[-1].files[0].created")),
    }
}

/// Build the URL of the addon's version listing, below `addons_uri`, e.g.
/// `{addons_uri}/addon/{guid}/versions/`. The guid is percent-encoded as a path segment.
pub fn versions_url(addons_uri: &Url, guid: &str) -> Option<Url> {
    let mut url = addons_uri.clone();
    url.set_query(None);
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(["addon", guid, "versions", ""]);
    Some(url)
}

/// Recover the guid from a versions URL as echoed by the API, decoding percent-escapes.
pub fn guid_from_versions_url(url: &str) -> Result<String, PayloadError> {
    let not_found = || PayloadError::GuidNotInUrl(url.to_owned());
    let parsed = Url::parse(url).map_err(|_| not_found())?;
    let mut segments = parsed.path_segments().ok_or_else(not_found)?;

    segments
        .by_ref()
        .find(|segment| *segment == "addon")
        .ok_or_else(not_found)?;
    let encoded = segments.next().filter(|s| !s.is_empty()).ok_or_else(not_found)?;

    percent_decode_str(encoded)
        .decode_utf8()
        .map(|guid| guid.into_owned())
        .map_err(|_| not_found())
}

/// Point a URL at a specific page, replacing any existing query.
pub fn with_page(url: &Url, page: u64) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.query_pairs_mut().append_pair("page", &page.to_string());
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_count_and_results() {
        let mut page = json!({"page_count": 3, "results": [{"guid": "a"}, {"name": "b"}]});

        assert_eq!(page_count(&page).unwrap(), 3);
        let results = take_results(&mut page).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(record_guid(&results[0]), Some("a"));
        assert_eq!(record_guid(&results[1]), None);
    }

    #[test]
    fn test_missing_or_malformed_envelope() {
        assert!(matches!(
            page_count(&json!({"results": []})),
            Err(PayloadError::MissingKey("page_count"))
        ));
        assert!(matches!(
            page_count(&json!({"page_count": "3"})),
            Err(PayloadError::UnexpectedShape { .. })
        ));
        assert!(matches!(
            take_results(&mut json!({"results": {}})),
            Err(PayloadError::UnexpectedShape { key: "results", .. })
        ));
        assert!(matches!(
            take_results(&mut json!({})),
            Err(PayloadError::MissingKey("results"))
        ));
    }

    #[test]
    fn test_last_version_created() {
        let mut page = json!({
            "page_count": 2,
            "results": [
                {"files": [{"created": "2021-05-01T00:00:00Z"}]},
                {"files": [{"created": "2020-01-01T00:00:00Z"}, {"created": "2020-02-01"}]}
            ]
        });

        assert_eq!(
            last_version_created(&mut page).unwrap(),
            "2020-01-01T00:00:00Z"
        );
        assert!(matches!(
            last_version_created(&mut json!({"results": []})),
            Err(PayloadError::MissingKey("results[-1]"))
        ));
        assert!(matches!(
            last_version_created(&mut json!({"results": [{"files": []}]})),
            Err(PayloadError::MissingKey("results[-1].files[0]"))
        ));
    }

    #[test]
    fn test_versions_url_round_trips_the_guid() {
        let addons_uri = Url::parse("https://addons.example.org/api/v3/addons/").unwrap();

        for guid in ["{feb799e2-29e2-4e35-b862-cc4e1842b6f5}", "blocker@example.com", "a b"] {
            let url = versions_url(&addons_uri, guid).unwrap();
            assert!(url.path().starts_with("/api/v3/addons/addon/"));
            assert!(url.path().ends_with("/versions/"));
            assert_eq!(guid_from_versions_url(url.as_str()).unwrap(), guid);

            let last_page = with_page(&url, 4);
            assert_eq!(last_page.query(), Some("page=4"));
            assert_eq!(guid_from_versions_url(last_page.as_str()).unwrap(), guid);
        }
    }

    #[test]
    fn test_guid_from_unrelated_url() {
        assert!(matches!(
            guid_from_versions_url("https://addons.example.org/api/v3/addons/search/"),
            Err(PayloadError::GuidNotInUrl(_))
        ));
        assert!(guid_from_versions_url("not a url").is_err());
    }
}
