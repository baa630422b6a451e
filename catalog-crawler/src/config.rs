use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::catalog::MissingDatePolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "https://addons.mozilla.org/api/v3/addons/search/")]
    pub search_uri: NonEmptyString,

    #[envconfig(default = "app=firefox&sort=created&type=extension")]
    pub search_query: String,

    #[envconfig(default = "https://addons.mozilla.org/api/v3/addons/")]
    pub addons_uri: NonEmptyString,

    #[envconfig(default = "/tmp/amo_cache")]
    pub addon_cache_dir: NonEmptyString,

    #[envconfig(default = "/tmp/amo_dates")]
    pub dates_cache_dir: NonEmptyString,

    #[envconfig(default = "50")]
    pub max_concurrent_requests: usize,

    #[envconfig(default = "30000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "false")]
    pub retry_enrichment: bool,

    #[envconfig(default = "false")]
    pub drop_invalid_fields: bool,

    #[envconfig(default = "skip")]
    pub missing_date_policy: MissingDatePolicy,

    /// Write the catalog as JSON lines to this file instead of stdout.
    pub output_path: Option<NonEmptyString>,

    #[envconfig(default = "catalog-crawler/0.1")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
