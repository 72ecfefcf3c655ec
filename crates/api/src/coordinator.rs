//! Read-endpoint logic: snapshot cache in front of a concurrent fan-out to
//! all configured sources, with partial failures tolerated and reported.

use crate::error::ApiError;
use chainpulse_ingestor::{
    error::{FetchError, Result as FetchResult},
    source::{ChainSource, StakeSource},
    types::{ChainMetrics, Network, ValidatorRecord},
};
use chainpulse_processor::{
    aggregate::{self, AggregatedMetrics, SubnetSeed, SubnetStake},
    cache::{CacheStatus, CacheStore},
};
use chainpulse_settings::Settings;
use chrono::Utc;
use futures::future::{join, join_all};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};
use tokio::time::timeout;
use tracing::{info, warn};

const SNAPSHOT_KEY: &str = "latest";

/// One published snapshot of the whole network. Replaced atomically on
/// refresh, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkOverview {
    pub chains: Vec<ChainMetrics>,
    pub aggregated: AggregatedMetrics,
    /// Epoch milliseconds of the refresh that produced this snapshot.
    pub last_updated: i64,
    pub total_chains: usize,
    pub failed_chains: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewResponse {
    #[serde(flatten)]
    pub overview: NetworkOverview,
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub cache_status: CacheStatus,
    pub duration_ms: u64,
    pub total_chains: usize,
    pub failed_chains: usize,
}

#[derive(Clone)]
pub struct Coordinator {
    settings: Arc<Settings>,
    network: Network,
    chain_source: Arc<dyn ChainSource>,
    stake_source: Arc<dyn StakeSource>,
    snapshot_cache: Arc<CacheStore<NetworkOverview>>,
    chain_cache: Arc<CacheStore<ChainMetrics>>,
    validator_cache: Arc<CacheStore<Arc<Vec<ValidatorRecord>>>>,
    version_cache: Arc<CacheStore<Arc<HashMap<String, String>>>>,
}

impl Coordinator {
    pub fn new(
        settings: Settings,
        network: Network,
        chain_source: Arc<dyn ChainSource>,
        stake_source: Arc<dyn StakeSource>,
    ) -> Self {
        Self {
            snapshot_cache: Arc::new(CacheStore::new("snapshot", settings.snapshot_ttl())),
            chain_cache: Arc::new(CacheStore::new("chains", settings.source_ttl())),
            validator_cache: Arc::new(CacheStore::new("validators", settings.source_ttl())),
            version_cache: Arc::new(CacheStore::new("versions", settings.version_ttl())),
            settings: Arc::new(settings),
            network,
            chain_source,
            stake_source,
        }
    }

    /// Overview read: serve the snapshot when fresh, otherwise fan out to all
    /// configured chains and aggregate whatever settled in time.
    pub async fn overview(&self, bypass: bool) -> Result<OverviewResponse, ApiError> {
        let started = Instant::now();

        if bypass {
            info!("cache bypass requested, clearing overview caches");
            self.snapshot_cache.invalidate(SNAPSHOT_KEY);
            self.chain_cache.invalidate_all();
        }

        let this = self.clone();
        let lookup = self
            .snapshot_cache
            .get(SNAPSHOT_KEY, move || this.refresh_overview())
            .await
            .map_err(ApiError::from_fetch)?;

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("chainpulse_overview_duration_ms").record(duration_ms as f64);

        let overview = lookup.data;
        Ok(OverviewResponse {
            meta: ResponseMeta {
                cache_status: lookup.status,
                duration_ms,
                total_chains: overview.total_chains,
                failed_chains: overview.failed_chains,
            },
            overview,
        })
    }

    /// Stake distribution per subnet for one network.
    pub async fn subnet_stats(&self, network: Network) -> Result<Vec<SubnetStake>, ApiError> {
        let seeds: Vec<SubnetSeed> = self
            .settings
            .chains
            .iter()
            .map(|chain| SubnetSeed {
                id: chain.subnet_id.clone(),
                name: chain.name.clone(),
            })
            .collect();

        let per_source = self.settings.per_source_timeout();

        let validators_fut = {
            let cache = self.validator_cache.clone();
            let source = self.stake_source.clone();
            async move {
                cache
                    .get(&format!("validators:{network}"), move || async move {
                        match timeout(per_source, source.validators(network)).await {
                            Ok(result) => result.map(Arc::new),
                            Err(_) => Err(FetchError::Timeout),
                        }
                    })
                    .await
            }
        };

        let versions_fut = {
            let cache = self.version_cache.clone();
            let source = self.stake_source.clone();
            async move {
                cache
                    .get(&format!("versions:{network}"), move || async move {
                        match timeout(per_source, source.client_versions(network)).await {
                            Ok(result) => result.map(Arc::new),
                            Err(_) => Err(FetchError::Timeout),
                        }
                    })
                    .await
            }
        };

        let (validators, versions) =
            timeout(self.settings.overall_deadline(), join(validators_fut, versions_fut))
                .await
                .map_err(|_| ApiError::AggregateTimeout)?;

        let validators = validators.map_err(ApiError::from_fetch)?.data;

        // A dead version feed degrades to "Unknown" buckets rather than
        // failing the whole request.
        let versions = match versions {
            Ok(lookup) => lookup.data,
            Err(err) => {
                warn!(%network, error = %err, "client-version feed unavailable");
                Arc::new(HashMap::new())
            }
        };

        let subnets = aggregate::aggregate_stake(&seeds, &validators, &versions)?;
        Ok(subnets)
    }

    async fn refresh_overview(self) -> FetchResult<NetworkOverview> {
        let total_chains = self.settings.chains.len();
        let per_source = self.settings.per_source_timeout();

        let fetches = self.settings.chains.iter().map(|chain| {
            let chain = chain.clone();
            let cache = self.chain_cache.clone();
            let source = self.chain_source.clone();
            let network = self.network;
            async move {
                let key = format!("chain:{}", chain.id);
                cache
                    .get(&key, move || async move {
                        match timeout(per_source, source.fetch_chain(network, &chain)).await {
                            Ok(result) => result,
                            Err(_) => Err(FetchError::Timeout),
                        }
                    })
                    .await
            }
        });

        let settled = timeout(self.settings.overall_deadline(), join_all(fetches))
            .await
            .map_err(|_| FetchError::Timeout)?;

        let mut chains = Vec::with_capacity(total_chains);
        let mut failed_chains = 0;
        for result in settled {
            match result {
                Ok(lookup) => chains.push(lookup.data),
                Err(err) => {
                    warn!(error = %err, "chain source failed, excluding from aggregate");
                    failed_chains += 1;
                }
            }
        }

        metrics::counter!("chainpulse_chains_failed").increment(failed_chains as u64);
        info!(
            total = total_chains,
            failed = failed_chains,
            "refreshed network overview"
        );

        let aggregated = aggregate::aggregate_chains(&chains);
        Ok(NetworkOverview {
            chains,
            aggregated,
            last_updated: Utc::now().timestamp_millis(),
            total_chains,
            failed_chains,
        })
    }
}
