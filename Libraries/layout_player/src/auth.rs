//! Bearer tokens for the region metadata service.

use crate::error::{PlayerError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    api_key: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Exchanges an API key for a bearer token once and caches it.
/// Concurrent callers wait on the same exchange instead of starting their own.
pub struct TokenProvider {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    user_id: String,
    cached: Mutex<Option<String>>,
}

impl TokenProvider {
    pub fn new(client: Client, endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            user_id: format!("viewer-{}", uuid::Uuid::new_v4()),
            cached: Mutex::new(None),
        }
    }

    /// A provider that never talks to a token endpoint.
    pub fn manual(client: Client, token: String) -> Self {
        Self {
            cached: Mutex::new(Some(token)),
            ..Self::new(client, None, None)
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn set_manual_token(&self, token: String) {
        info!("Using manually supplied auth token");
        *self.cached.lock().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.cached.lock().await = None;
    }

    #[instrument(skip_all, fields(user_id = %self.user_id))]
    pub async fn token(&self) -> Result<String> {
        // Held across the exchange so that only one request is ever outstanding.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let (Some(endpoint), Some(api_key)) = (self.endpoint.as_deref(), self.api_key.as_deref()) else {
            return Err(PlayerError::TokenAcquisition(
                "no token endpoint or API key configured".into(),
            ));
        };

        debug!("Requesting auth token from {}", endpoint);
        let response = self
            .client
            .post(endpoint)
            .json(&TokenRequest {
                api_key,
                user_id: &self.user_id,
            })
            .send()
            .await
            .map_err(|e| PlayerError::TokenAcquisition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlayerError::TokenAcquisition(format!(
                "token endpoint answered {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlayerError::TokenAcquisition(e.to_string()))?;
        let token = body
            .token
            .or(body.access_token)
            .ok_or_else(|| PlayerError::TokenAcquisition("response carried no token".into()))?;

        info!("Acquired auth token");
        *cached = Some(token.clone());
        Ok(token)
    }
}
