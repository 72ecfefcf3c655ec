use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log: String,
    #[serde(default)]
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    pub chains: Vec<ChainInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub metrics_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Base URL of the chain-metrics API.
    pub metrics_base_url: String,
    /// Base URL of the validator-listing API.
    pub platform_base_url: String,
    /// Flat JSON feed of node-id -> client-version entries.
    pub version_feed_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL of the top-level overview snapshot.
    pub snapshot_ttl_secs: u64,
    /// TTL of per-chain and per-network source caches.
    pub source_ttl_secs: u64,
    /// TTL of the client-version feed cache (refreshes faster than stake data).
    pub version_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Budget for a single upstream source, including retries.
    pub per_source_secs: u64,
    /// Deadline for an entire fan-out request.
    pub overall_secs: u64,
}

/// One entry of the static list of known chains used to seed iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    pub id: String,
    pub name: String,
    pub subnet_id: String,
    #[serde(default)]
    pub logo: Option<String>,
}

impl Settings {
    pub fn new<P: AsRef<Path>>(path: Option<P>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        if let Some(file) = path {
            builder = builder
                .add_source(File::with_name(&file.as_ref().to_string_lossy()).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("CHAINPULSE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize())
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.snapshot_ttl_secs)
    }

    pub fn source_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.source_ttl_secs)
    }

    pub fn version_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.version_ttl_secs)
    }

    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.per_source_secs)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.timeouts.overall_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            metrics_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 300,
            source_ttl_secs: 120,
            version_ttl_secs: 60,
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            per_source_secs: 10,
            overall_secs: 30,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
