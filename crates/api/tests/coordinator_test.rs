use async_trait::async_trait;
use chainpulse_api::{coordinator::Coordinator, error::ApiError};
use chainpulse_ingestor::{
    error::{FetchError, Result as FetchResult},
    source::{ChainSource, StakeSource},
    types::{ChainMetrics, MetricPoint, Network, TimeSeriesMetric, ValidatorRecord},
};
use chainpulse_processor::cache::CacheStatus;
use chainpulse_settings::{
    CacheSettings, ChainInfo, ServerSettings, Settings, TimeoutSettings, UpstreamSettings,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

const JAN_1: i64 = 1704067200; // 2024-01-01T00:00:00Z

#[derive(Default)]
struct StubChainSource {
    calls: AtomicUsize,
    hang_chain: Option<String>,
    fail_chain: Option<String>,
}

#[async_trait]
impl ChainSource for StubChainSource {
    async fn fetch_chain(&self, _network: Network, chain: &ChainInfo) -> FetchResult<ChainMetrics> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang_chain.as_deref() == Some(chain.id.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_chain.as_deref() == Some(chain.id.as_str()) {
            return Err(FetchError::Transport("connection refused".into()));
        }

        Ok(ChainMetrics {
            chain_id: chain.id.clone(),
            chain_name: chain.name.clone(),
            tx_count: TimeSeriesMetric::new(vec![MetricPoint::new(JAN_1, 10)]),
            validator_count: Some(4),
            ..ChainMetrics::default()
        })
    }
}

#[derive(Default)]
struct StubStakeSource {
    validators: Vec<ValidatorRecord>,
    versions: HashMap<String, String>,
    fail_validators: bool,
    fail_versions: bool,
}

#[async_trait]
impl StakeSource for StubStakeSource {
    async fn validators(&self, _network: Network) -> FetchResult<Vec<ValidatorRecord>> {
        if self.fail_validators {
            return Err(FetchError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            });
        }
        Ok(self.validators.clone())
    }

    async fn client_versions(&self, _network: Network) -> FetchResult<HashMap<String, String>> {
        if self.fail_versions {
            return Err(FetchError::Transport("feed down".into()));
        }
        Ok(self.versions.clone())
    }
}

fn test_settings(chain_count: usize) -> Settings {
    Settings {
        log: "info".to_string(),
        server: ServerSettings::default(),
        upstream: UpstreamSettings {
            metrics_base_url: "http://127.0.0.1:1".to_string(),
            platform_base_url: "http://127.0.0.1:1".to_string(),
            version_feed_url: "http://127.0.0.1:1/versions".to_string(),
        },
        cache: CacheSettings {
            snapshot_ttl_secs: 60,
            source_ttl_secs: 60,
            version_ttl_secs: 60,
        },
        timeouts: TimeoutSettings {
            per_source_secs: 1,
            overall_secs: 10,
        },
        chains: (1..=chain_count)
            .map(|i| ChainInfo {
                id: format!("chain-{i}"),
                name: format!("Chain {i}"),
                subnet_id: format!("subnet-{i}"),
                logo: None,
            })
            .collect(),
    }
}

fn coordinator(
    settings: Settings,
    chains: StubChainSource,
    stake: StubStakeSource,
) -> (Coordinator, Arc<StubChainSource>) {
    let chains = Arc::new(chains);
    let coordinator = Coordinator::new(
        settings,
        Network::Mainnet,
        chains.clone(),
        Arc::new(stake),
    );
    (coordinator, chains)
}

#[tokio::test]
async fn one_failing_chain_degrades_instead_of_failing() {
    let (coordinator, _) = coordinator(
        test_settings(3),
        StubChainSource {
            fail_chain: Some("chain-2".to_string()),
            ..StubChainSource::default()
        },
        StubStakeSource::default(),
    );

    let response = coordinator.overview(false).await.unwrap();
    assert_eq!(response.overview.chains.len(), 2);
    assert_eq!(response.meta.failed_chains, 1);
    assert_eq!(response.meta.total_chains, 3);
    assert_eq!(response.overview.aggregated.points[0].tx_count, 20);
}

#[tokio::test]
async fn hanging_chain_is_cut_off_by_its_per_source_timeout() {
    let (coordinator, _) = coordinator(
        test_settings(3),
        StubChainSource {
            hang_chain: Some("chain-2".to_string()),
            ..StubChainSource::default()
        },
        StubStakeSource::default(),
    );

    let started = Instant::now();
    let response = coordinator.overview(false).await.unwrap();

    assert_eq!(response.overview.chains.len(), 2);
    assert_eq!(response.meta.failed_chains, 1);
    // well within the 10s overall deadline: only the 1s per-source budget passed
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn reads_within_ttl_are_idempotent_and_fetch_once() {
    let (coordinator, chains) = coordinator(
        test_settings(3),
        StubChainSource::default(),
        StubStakeSource::default(),
    );

    let first = coordinator.overview(false).await.unwrap();
    let second = coordinator.overview(false).await.unwrap();

    assert_eq!(first.meta.cache_status, CacheStatus::Miss);
    assert_eq!(second.meta.cache_status, CacheStatus::Hit);
    assert_eq!(first.overview.last_updated, second.overview.last_updated);
    assert_eq!(chains.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn bypass_clears_caches_and_refetches() {
    let (coordinator, chains) = coordinator(
        test_settings(2),
        StubChainSource::default(),
        StubStakeSource::default(),
    );

    coordinator.overview(false).await.unwrap();
    let refreshed = coordinator.overview(true).await.unwrap();

    assert_eq!(refreshed.meta.cache_status, CacheStatus::Miss);
    assert_eq!(chains.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn overall_deadline_produces_a_timeout_error() {
    let mut settings = test_settings(1);
    settings.timeouts = TimeoutSettings {
        per_source_secs: 30,
        overall_secs: 1,
    };
    let (coordinator, _) = coordinator(
        settings,
        StubChainSource {
            hang_chain: Some("chain-1".to_string()),
            ..StubChainSource::default()
        },
        StubStakeSource::default(),
    );

    let err = coordinator.overview(false).await.unwrap_err();
    assert!(matches!(err, ApiError::AggregateTimeout));
}

fn validator(node: &str, subnet: &str, weight: u64) -> ValidatorRecord {
    ValidatorRecord {
        node_id: node.to_string(),
        subnet_id: subnet.to_string(),
        weight,
        is_l1: false,
    }
}

#[tokio::test]
async fn subnet_stats_buckets_stake_by_subnet_and_version() {
    let (coordinator, _) = coordinator(
        test_settings(2),
        StubChainSource::default(),
        StubStakeSource {
            validators: vec![
                validator("n1", "subnet-1", 100),
                validator("n2", "subnet-1", 50),
                validator("n3", "subnet-2", 7),
            ],
            versions: HashMap::from([("n1".to_string(), "avalanche/1.11.2".to_string())]),
            ..StubStakeSource::default()
        },
    );

    let subnets = coordinator.subnet_stats(Network::Mainnet).await.unwrap();
    assert_eq!(subnets.len(), 2);
    assert_eq!(subnets[0].id, "subnet-1");
    assert_eq!(subnets[0].total_stake, 150);
    assert_eq!(subnets[0].by_client_version["1.11.2"].stake, 100);
    assert_eq!(subnets[0].by_client_version["Unknown"].stake, 50);
    assert_eq!(subnets[1].total_stake, 7);
}

#[tokio::test]
async fn validator_listing_failure_is_a_server_error() {
    let (coordinator, _) = coordinator(
        test_settings(1),
        StubChainSource::default(),
        StubStakeSource {
            fail_validators: true,
            ..StubStakeSource::default()
        },
    );

    let err = coordinator.subnet_stats(Network::Mainnet).await.unwrap_err();
    assert!(matches!(err, ApiError::Upstream(_)));
}

#[tokio::test]
async fn dead_version_feed_degrades_to_unknown_buckets() {
    let (coordinator, _) = coordinator(
        test_settings(1),
        StubChainSource::default(),
        StubStakeSource {
            validators: vec![validator("n1", "subnet-1", 9)],
            fail_versions: true,
            ..StubStakeSource::default()
        },
    );

    let subnets = coordinator.subnet_stats(Network::Mainnet).await.unwrap();
    assert_eq!(subnets[0].by_client_version["Unknown"].node_count, 1);
}

#[tokio::test]
async fn duplicate_subnet_configuration_is_fatal() {
    let mut settings = test_settings(2);
    settings.chains[1].subnet_id = settings.chains[0].subnet_id.clone();
    let (coordinator, _) = coordinator(
        settings,
        StubChainSource::default(),
        StubStakeSource {
            validators: vec![validator("n1", "subnet-1", 9)],
            ..StubStakeSource::default()
        },
    );

    let err = coordinator.subnet_stats(Network::Mainnet).await.unwrap_err();
    assert!(matches!(err, ApiError::Configuration(_)));
}
