use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// Networks the API can serve stake data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Fuji,
}

impl Network {
    pub const ACCEPTED: &'static [&'static str] = &["mainnet", "fuji"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Fuji => "fuji",
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "fuji" => Ok(Network::Fuji),
            other => Err(format!(
                "unknown network {other:?}, accepted values: {}",
                Self::ACCEPTED.join(", ")
            )),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample of an upstream time series. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Epoch seconds of the period the sample covers.
    pub timestamp: i64,
    /// UTC calendar date of `timestamp`, YYYY-MM-DD.
    pub date: String,
    pub value: u64,
}

impl MetricPoint {
    pub fn new(timestamp: i64, value: u64) -> Self {
        let date = match Utc.timestamp_opt(timestamp, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => String::new(),
        };
        Self {
            timestamp,
            date,
            value,
        }
    }
}

/// Time series ordered most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesMetric {
    pub points: Vec<MetricPoint>,
}

impl TimeSeriesMetric {
    pub fn new(points: Vec<MetricPoint>) -> Self {
        Self { points }
    }

    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.first()
    }

    /// Value of the freshest point, zero for an empty series.
    pub fn current_value(&self) -> u64 {
        self.latest().map(|p| p.value).unwrap_or(0)
    }
}

/// Per-chain metric bundle, one per configured chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainMetrics {
    pub chain_id: String,
    pub chain_name: String,
    #[serde(default)]
    pub logo: Option<String>,
    pub tx_count: TimeSeriesMetric,
    pub daily_active_addresses: TimeSeriesMetric,
    pub weekly_active_addresses: TimeSeriesMetric,
    pub monthly_active_addresses: TimeSeriesMetric,
    pub icm_messages: TimeSeriesMetric,
    /// None when the upstream could not report a count for the chain's subnet.
    pub validator_count: Option<u64>,
}

impl ChainMetrics {
    /// A chain counts as active when it saw transactions or daily-active
    /// addresses in its freshest complete period.
    pub fn is_active(&self) -> bool {
        self.tx_count.current_value() > 0 || self.daily_active_addresses.current_value() > 0
    }
}

/// A validator as reported by either listing variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub node_id: String,
    pub subnet_id: String,
    pub weight: u64,
    /// True when the record came from the weight-based (L1) listing.
    pub is_l1: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_parses_accepted_values_only() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("fuji".parse::<Network>().unwrap(), Network::Fuji);
        let err = "testnet".parse::<Network>().unwrap_err();
        assert!(err.contains("mainnet"));
        assert!(err.contains("fuji"));
    }

    #[test]
    fn metric_point_derives_utc_date() {
        let point = MetricPoint::new(1704067200, 42); // 2024-01-01T00:00:00Z
        assert_eq!(point.date, "2024-01-01");
    }

    #[test]
    fn current_value_is_zero_for_empty_series() {
        assert_eq!(TimeSeriesMetric::default().current_value(), 0);
    }

    #[test]
    fn chain_activity_uses_tx_count_or_daily_addresses() {
        let mut chain = ChainMetrics::default();
        assert!(!chain.is_active());

        chain.tx_count = TimeSeriesMetric::new(vec![MetricPoint::new(1704067200, 10)]);
        assert!(chain.is_active());

        chain.tx_count = TimeSeriesMetric::default();
        chain.daily_active_addresses = TimeSeriesMetric::new(vec![MetricPoint::new(1704067200, 3)]);
        assert!(chain.is_active());
    }
}
