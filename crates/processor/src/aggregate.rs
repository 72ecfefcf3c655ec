//! Merges per-source results into the aggregate views served by the API.

use chainpulse_ingestor::types::{ChainMetrics, TimeSeriesMetric, ValidatorRecord};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

pub const UNKNOWN_VERSION: &str = "Unknown";

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("subnet {0} seeded twice into the stake accumulator")]
    DuplicateSubnet(String),
}

/// Network-wide totals for one calendar date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedPoint {
    pub timestamp: i64,
    pub date: String,
    pub tx_count: u64,
    pub daily_active_addresses: u64,
    pub weekly_active_addresses: u64,
    pub monthly_active_addresses: u64,
    pub icm_messages: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedMetrics {
    /// One point per date, sorted descending by timestamp.
    pub points: Vec<AggregatedPoint>,
    pub active_chains: usize,
    pub total_validators: u64,
}

/// Sums each chain's freshest point into date-keyed buckets.
///
/// Chains that failed upstream arrive here as empty bundles and simply
/// contribute nothing. Validator counts sum over chains with a numeric
/// count only; an unavailable count excludes the chain from the sum but
/// not from enumeration.
pub fn aggregate_chains(chains: &[ChainMetrics]) -> AggregatedMetrics {
    let mut buckets: HashMap<String, AggregatedPoint> = HashMap::new();
    let mut active_chains = 0;
    let mut total_validators = 0u64;

    for chain in chains {
        if chain.is_active() {
            active_chains += 1;
        }
        if let Some(count) = chain.validator_count {
            total_validators += count;
        }

        add_latest(&mut buckets, &chain.tx_count, |p, v| p.tx_count += v);
        add_latest(&mut buckets, &chain.daily_active_addresses, |p, v| {
            p.daily_active_addresses += v
        });
        add_latest(&mut buckets, &chain.weekly_active_addresses, |p, v| {
            p.weekly_active_addresses += v
        });
        add_latest(&mut buckets, &chain.monthly_active_addresses, |p, v| {
            p.monthly_active_addresses += v
        });
        add_latest(&mut buckets, &chain.icm_messages, |p, v| {
            p.icm_messages += v
        });
    }

    let mut points: Vec<AggregatedPoint> = buckets.into_values().collect();
    points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    AggregatedMetrics {
        points,
        active_chains,
        total_validators,
    }
}

fn add_latest(
    buckets: &mut HashMap<String, AggregatedPoint>,
    series: &TimeSeriesMetric,
    apply: impl Fn(&mut AggregatedPoint, u64),
) {
    let Some(point) = series.latest() else {
        return;
    };
    let bucket = buckets
        .entry(point.date.clone())
        .or_insert_with(|| AggregatedPoint {
            timestamp: point.timestamp,
            date: point.date.clone(),
            ..AggregatedPoint::default()
        });
    bucket.timestamp = bucket.timestamp.max(point.timestamp);
    apply(bucket, point.value);
}

/// A subnet from the authoritative listing, used to seed accumulators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSeed {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStake {
    #[serde(rename = "stakeString", serialize_with = "u128_as_decimal_string")]
    pub stake: u128,
    pub node_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetStake {
    pub name: String,
    pub id: String,
    #[serde(serialize_with = "u128_as_decimal_string")]
    pub total_stake: u128,
    pub by_client_version: BTreeMap<String, VersionStake>,
    pub is_l1: bool,
}

/// Stake totals are integral sums of u64 weights; serializing them as
/// decimal strings keeps full precision past JSON's float range.
fn u128_as_decimal_string<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Buckets validator stake per subnet and per client version.
///
/// Every seeded subnet starts at zero stake; seeding the same subnet id
/// twice is a configuration error, not a merge. Weights accumulate as u128
/// so sums stay exact. Subnets left at zero stake are dropped from the
/// output, which is sorted descending by total stake.
pub fn aggregate_stake(
    seeds: &[SubnetSeed],
    validators: &[ValidatorRecord],
    versions: &HashMap<String, String>,
) -> Result<Vec<SubnetStake>, AggregationError> {
    let mut accumulators: HashMap<String, SubnetStake> = HashMap::new();

    for seed in seeds {
        let previous = accumulators.insert(
            seed.id.clone(),
            SubnetStake {
                name: seed.name.clone(),
                id: seed.id.clone(),
                total_stake: 0,
                by_client_version: BTreeMap::new(),
                is_l1: false,
            },
        );
        if previous.is_some() {
            return Err(AggregationError::DuplicateSubnet(seed.id.clone()));
        }
    }

    for validator in validators {
        let Some(subnet) = accumulators.get_mut(&validator.subnet_id) else {
            debug!(subnet_id = %validator.subnet_id, "validator for unseeded subnet, skipping");
            continue;
        };

        subnet.total_stake += u128::from(validator.weight);
        subnet.is_l1 |= validator.is_l1;

        let version = versions
            .get(&validator.node_id)
            .map(|raw| normalize_version(raw))
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let bucket = subnet.by_client_version.entry(version).or_default();
        bucket.stake += u128::from(validator.weight);
        bucket.node_count += 1;
    }

    let mut subnets: Vec<SubnetStake> = accumulators
        .into_values()
        .filter(|subnet| subnet.total_stake > 0)
        .collect();
    subnets.sort_by(|a, b| {
        b.total_stake
            .cmp(&a.total_stake)
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(subnets)
}

/// Version feeds report e.g. "avalanche/1.11.2"; only the part after the
/// client prefix is meaningful for bucketing.
pub fn normalize_version(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN_VERSION.to_string();
    }
    match trimmed.rsplit_once('/') {
        Some((_, version)) if !version.is_empty() => version.to_string(),
        _ => trimmed.to_string(),
    }
}
