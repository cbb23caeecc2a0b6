//! Sources of random strings for the `random_string` operation.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;

pub const FIXED_RANDOM_STRING: &str = "MOCKSTRING";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("random string provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RandomStringProvider: Send + Sync {
    /// Produce one string of `length` characters.
    async fn random_string(&self, length: u32) -> Result<String, ProviderError>;
}

/// Calls a random.org compatible `/strings/` endpoint.
pub struct RandomOrgProvider {
    client: reqwest::Client,
    base_url: String,
}

impl RandomOrgProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl RandomStringProvider for RandomOrgProvider {
    async fn random_string(&self, length: u32) -> Result<String, ProviderError> {
        let length = length.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("num", "1"),
                ("len", length.as_str()),
                ("digits", "on"),
                ("upperalpha", "on"),
                ("loweralpha", "on"),
                ("unique", "on"),
                ("format", "plain"),
                ("rnd", "new"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "unexpected status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let value = body.trim_end();
        if value.is_empty() {
            return Err(ProviderError::Unavailable("empty response body".into()));
        }
        Ok(value.to_string())
    }
}

/// Always answers with the same string, whatever the requested length.
pub struct FixedStringProvider {
    value: String,
}

impl FixedStringProvider {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Default for FixedStringProvider {
    fn default() -> Self {
        Self::new(FIXED_RANDOM_STRING)
    }
}

#[async_trait]
impl RandomStringProvider for FixedStringProvider {
    async fn random_string(&self, _length: u32) -> Result<String, ProviderError> {
        Ok(self.value.clone())
    }
}

/// Build the provider described by `config`.
pub fn provider_from_config(
    config: &ProviderConfig,
) -> Result<Arc<dyn RandomStringProvider>, ProviderError> {
    let provider: Arc<dyn RandomStringProvider> = match &config.fixed {
        Some(value) => Arc::new(FixedStringProvider::new(value.clone())),
        None => Arc::new(RandomOrgProvider::new(config)?),
    };
    Ok(provider)
}
