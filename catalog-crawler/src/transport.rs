use std::time;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header;

use crate::error::FetchError;

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL the response came from, after redirects.
    pub url: String,
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// The seam between the fetch pool and the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// A `Transport` backed by a `reqwest::Client`. Every request is bounded by `request_timeout`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: time::Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let into_fetch_error = |error: reqwest::Error| {
            if error.is_timeout() {
                FetchError::Timeout {
                    url: url.to_owned(),
                }
            } else {
                FetchError::Request {
                    url: url.to_owned(),
                    error,
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(into_fetch_error)?;
        let echoed_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(into_fetch_error)?;

        Ok(FetchResponse {
            url: echoed_url,
            status,
            body,
        })
    }
}
