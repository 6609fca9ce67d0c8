use crate::config::network::REQUEST_TIMEOUT;
use crate::error::{LockError, LockResult};
use crate::utils::retry;
use reqwest::Client;
use serde::Deserialize;

/// Chain summary returned by the fee price feed
#[derive(Debug, Deserialize)]
pub struct ChainFees {
    /// Satoshis per kilobyte for fast confirmation
    pub high_fee_per_kb: u64,
}

impl ChainFees {
    /// High-priority rate in sat/byte
    pub fn sats_per_byte(&self) -> f64 {
        self.high_fee_per_kb as f64 / 1024.0
    }
}

/// Client for the fee price feed
#[derive(Debug, Clone)]
pub struct FeeRateClient {
    client: Client,
    url: String,
}

impl FeeRateClient {
    pub fn new(url: impl Into<String>) -> LockResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LockError::PriceFeedUnavailable {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> LockResult<ChainFees> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(LockError::PriceFeedUnavailable {
                message: format!("HTTP {} from {}", response.status(), self.url),
            });
        }

        Ok(response.json().await?)
    }

    /// Recommended rate in sat/byte
    pub async fn recommended_fee_rate(&self) -> LockResult<f64> {
        let fees = retry::with_backoff(|| self.fetch())
            .await
            .map_err(|e| match e {
                LockError::PriceFeedUnavailable { .. } => e,
                other => LockError::PriceFeedUnavailable {
                    message: other.to_string(),
                },
            })?;

        let rate = fees.sats_per_byte();
        log::info!("Fee price feed recommends {:.3} sat/byte", rate);
        Ok(rate)
    }

    /// Recommended rate, or `fallback` when the feed is unreachable
    pub async fn fee_rate_or(&self, fallback: f64) -> f64 {
        match self.recommended_fee_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                log::warn!("{}; using fallback rate {} sat/byte", e, fallback);
                fallback
            }
        }
    }
}
