use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::transport::{FetchResponse, Transport};

#[derive(Debug, Clone)]
pub enum MockReply {
    Response { status: u16, body: String },
    Timeout,
}

impl MockReply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        MockReply::Response {
            status,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        MockReply::Response {
            status,
            body: String::new(),
        }
    }
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, VecDeque<MockReply>>,
    hits: HashMap<String, usize>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// An in-memory `Transport`. Each URL replays its scripted replies in order, repeating the
/// last one; unscripted URLs answer 200 with an empty object.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, replies: Vec<MockReply>) -> Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.to_owned(), replies.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().unwrap().peak_in_flight
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            *state.hits.entry(url.to_owned()).or_default() += 1;
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);

            match state.routes.get_mut(url) {
                Some(replies) if replies.len() > 1 => replies.pop_front(),
                Some(replies) => replies.front().cloned(),
                None => None,
            }
            .unwrap_or_else(|| MockReply::json(200, "{}"))
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.state.lock().unwrap().in_flight -= 1;

        match reply {
            MockReply::Response { status, body } => Ok(FetchResponse {
                url: url.to_owned(),
                status,
                body: Bytes::from(body),
            }),
            MockReply::Timeout => Err(FetchError::Timeout {
                url: url.to_owned(),
            }),
        }
    }
}
