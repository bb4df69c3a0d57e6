use crate::error::{PlayerError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Anything able to produce the text of a master playlist.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpManifestSource {
    client: Client,
    max_retries: usize,
    base_delay: Duration,
}

impl HttpManifestSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Opt-in retries for transport and server errors; a fresh load is the default recovery.
    pub fn with_retries(mut self, max_retries: usize, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    /// A 4xx is final; other failures are retried with exponential backoff when configured.
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_failure = String::new();

        for attempt in 0..=self.max_retries {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .text()
                        .await
                        .map_err(|e| PlayerError::manifest_fetch(url, e.to_string()));
                }
                Ok(response) if response.status().is_client_error() => {
                    let status = response.status();
                    return Err(PlayerError::manifest_fetch(url, status_reason(status)));
                }
                Ok(response) => {
                    error!("Received {} from {}", response.status(), url);
                    last_failure = status_reason(response.status());
                }
                Err(e) => {
                    error!("Manifest fetch failed (attempt {}): {}", attempt + 1, e);
                    last_failure = e.to_string();
                }
            }

            if attempt < self.max_retries {
                let delay = self.base_delay * 2u32.pow(attempt as u32);
                debug!("Retrying {} in {:?}", url, delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(PlayerError::manifest_fetch(url, last_failure))
    }
}

fn status_reason(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Appends a unique `param` so caches in front of the origin cannot answer the request.
pub fn cache_busted(url: &str, param: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair(param, &token);
            parsed.to_string()
        }
        Err(_) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{param}={token}")
        }
    }
}
