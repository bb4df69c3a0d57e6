use crate::auth::TokenProvider;
use crate::error::{PlayerError, Result};
use crate::regions::LayoutRegionSet;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

/// Source of region metadata for a stream path.
#[async_trait]
pub trait RegionSource: Send + Sync {
    async fn fetch(&self, stream_path: &str) -> Result<Vec<LayoutRegionSet>>;
}

pub struct HttpRegionSource {
    client: Client,
    service_url: String,
    tokens: Arc<TokenProvider>,
}

impl HttpRegionSource {
    pub fn new(client: Client, service_url: String, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            service_url,
            tokens,
        }
    }
}

#[async_trait]
impl RegionSource for HttpRegionSource {
    async fn fetch(&self, stream_path: &str) -> Result<Vec<LayoutRegionSet>> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| PlayerError::RegionConfigFetch(e.to_string()))?;

        debug!("Fetching region config for {}", stream_path);
        let response = self
            .client
            .get(&self.service_url)
            .query(&[("stream_path", stream_path)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PlayerError::RegionConfigFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlayerError::RegionConfigFetch(format!(
                "{} answered {}",
                self.service_url,
                response.status()
            )));
        }

        response
            .json::<Vec<LayoutRegionSet>>()
            .await
            .map_err(|e| PlayerError::RegionConfigFetch(e.to_string()))
    }
}
