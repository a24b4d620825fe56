use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::AcquireError;

const USER_AGENT: &str = concat!("bizkb/", env!("CARGO_PKG_VERSION"));

/// Default per-request budget. Timeouts surface as acquisition
/// failures, which makes them eligible for the stale-cache fallback.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// The HTTP capability consumed by the document acquirer.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, AcquireError>;
}

/// Production fetcher backed by a shared `reqwest` client.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AcquireError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, AcquireError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
