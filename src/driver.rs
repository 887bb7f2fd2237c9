//! Client side of the cancellation probe.
//!
//! A probe requests a fixture, waits for the first body chunk, drops the
//! response without reading further, and then asks the same fixture how far
//! its producer got.

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct ProbeOptions {
    /// Give up priming if no body data shows up within this window.
    pub first_chunk_timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            first_chunk_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub route: String,
    pub value: u64,
}

impl ProbeReport {
    pub fn within(&self, max: u64) -> bool {
        self.value <= max
    }
}

#[derive(Clone, Debug)]
pub struct Driver {
    base_url: Url,
    client: reqwest::Client,
    options: ProbeOptions,
}

impl Driver {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|err| Error::InvalidUrl(err.to_string()))?;
        if base_url.scheme() != "http" {
            return Err(Error::InvalidUrl(format!(
                "only http is supported, got {}",
                base_url.scheme()
            )));
        }
        // An abandoned body must close its connection, never park it for reuse.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            base_url,
            client,
            options: ProbeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ProbeOptions) -> Self {
        self.options = options;
        self
    }

    fn url(&self, route: &str) -> Result<Url> {
        self.base_url
            .join(route)
            .map_err(|err| Error::InvalidUrl(format!("{route}: {err}")))
    }

    /// Starts a streaming response on `route` and abandons it as soon as the
    /// first body chunk arrives.
    pub async fn prime(&self, route: &str) -> Result<()> {
        let url = self.url(route)?;
        let waited =
            tokio::time::timeout(self.options.first_chunk_timeout, self.first_chunk(url, route))
                .await;
        let response = match waited {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::InvalidResponse {
                    route: route.to_string(),
                    reason: "no body data before timeout".to_string(),
                });
            }
        };

        tracing::debug!(route, "first body chunk received, dropping connection");
        drop(response);
        Ok(())
    }

    /// Returns the response with its body partially read, so dropping it
    /// leaves unread data on the connection.
    async fn first_chunk(&self, url: Url, route: &str) -> Result<reqwest::Response> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidResponse {
                route: route.to_string(),
                reason: format!("unexpected status {status}"),
            });
        }

        loop {
            match response.chunk().await? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(_) => return Ok(response),
                None => {
                    return Err(Error::InvalidResponse {
                        route: route.to_string(),
                        reason: "body ended before any data".to_string(),
                    });
                }
            }
        }
    }

    /// Fetches `route` to completion and parses the body as the reported
    /// counter value.
    pub async fn fetch_counter(&self, route: &str) -> Result<u64> {
        let response = self.client.get(self.url(route)?).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::InvalidResponse {
                route: route.to_string(),
                reason: format!("status {status}: {body}"),
            });
        }

        body.trim()
            .parse::<u64>()
            .map_err(|_| Error::InvalidResponse {
                route: route.to_string(),
                reason: format!("expected an integer body, got {body:?}"),
            })
    }

    #[tracing::instrument(skip(self))]
    pub async fn probe(&self, route: &str) -> Result<ProbeReport> {
        self.prime(route).await?;
        let value = self.fetch_counter(route).await?;
        tracing::info!(route, value, "probe finished");
        Ok(ProbeReport {
            route: route.to_string(),
            value,
        })
    }

    pub async fn probe_all<'a>(
        &self,
        routes: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<ProbeReport>> {
        let mut reports = Vec::new();
        for route in routes {
            reports.push(self.probe(route).await?);
        }
        Ok(reports)
    }
}
