//! Trait seams between the coordinator and the upstream clients.

use crate::{
    error::Result,
    metrics_api::HttpMetricsClient,
    platform::PlatformClient,
    types::{ChainMetrics, Network, ValidatorRecord},
};
use async_trait::async_trait;
use chainpulse_settings::ChainInfo;
use std::collections::HashMap;

/// Source of per-chain metric bundles.
///
/// Implementations convert their own upstream failures into empty metrics;
/// an `Err` therefore only means the source as a whole was unreachable or
/// out of time, which the coordinator counts as a failed chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_chain(&self, network: Network, chain: &ChainInfo) -> Result<ChainMetrics>;
}

/// Source of validator sets and client versions.
#[async_trait]
pub trait StakeSource: Send + Sync {
    async fn validators(&self, network: Network) -> Result<Vec<ValidatorRecord>>;

    async fn client_versions(&self, network: Network) -> Result<HashMap<String, String>>;
}

#[async_trait]
impl ChainSource for HttpMetricsClient {
    async fn fetch_chain(&self, network: Network, chain: &ChainInfo) -> Result<ChainMetrics> {
        Ok(HttpMetricsClient::fetch_chain(self, network, chain).await)
    }
}

#[async_trait]
impl StakeSource for PlatformClient {
    async fn validators(&self, network: Network) -> Result<Vec<ValidatorRecord>> {
        PlatformClient::validators(self, network).await
    }

    async fn client_versions(&self, network: Network) -> Result<HashMap<String, String>> {
        PlatformClient::client_versions(self, network).await
    }
}
