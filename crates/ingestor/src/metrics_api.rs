use crate::{
    error::{FetchError, Result, fetch_with_retry},
    freshness::{MIN_COMPLETE_POINTS, second_most_recent, trim_incomplete_head},
    types::{ChainMetrics, MetricPoint, Network, TimeSeriesMetric},
};
use chainpulse_settings::ChainInfo;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Just enough history to apply the freshness policy with headroom for
/// upstream sources that omit empty periods.
const PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy)]
pub enum MetricKind {
    TxCount,
    ActiveAddresses,
}

impl MetricKind {
    fn path(&self) -> &'static str {
        match self {
            MetricKind::TxCount => "txCount",
            MetricKind::ActiveAddresses => "activeAddresses",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TimeInterval {
    Day,
    Week,
    Month,
}

impl TimeInterval {
    fn as_str(&self) -> &'static str {
        match self {
            TimeInterval::Day => "day",
            TimeInterval::Week => "week",
            TimeInterval::Month => "month",
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricSeriesResponse {
    #[serde(default)]
    results: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    timestamp: i64,
    #[serde(default)]
    value: u64,
}

/// Client for the per-chain metrics API.
#[derive(Debug, Clone)]
pub struct HttpMetricsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMetricsClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches one time-series metric for one chain.
    ///
    /// Never fails: network, HTTP and decode errors all fold into an empty
    /// series, logged and counted, so a bad source degrades rather than
    /// aborts an aggregation.
    pub async fn chain_metric(
        &self,
        chain_id: &str,
        kind: MetricKind,
        interval: TimeInterval,
    ) -> TimeSeriesMetric {
        let url = format!(
            "{}/v2/chains/{}/metrics/{}?timeInterval={}&pageSize={}",
            self.base_url,
            chain_id,
            kind.path(),
            interval.as_str(),
            PAGE_SIZE,
        );
        self.series_or_empty(&url, chain_id, kind.path()).await
    }

    /// Interchain-message volume for one chain.
    pub async fn icm_messages(&self, chain_id: &str) -> TimeSeriesMetric {
        let url = format!(
            "{}/v2/icm/chains/{}/messages?timeInterval=day&pageSize={}",
            self.base_url, chain_id, PAGE_SIZE,
        );
        self.series_or_empty(&url, chain_id, "icmMessages").await
    }

    /// Validator count for one subnet, None when unavailable.
    pub async fn subnet_validator_count(
        &self,
        network: Network,
        subnet_id: &str,
    ) -> Option<u64> {
        let url = format!(
            "{}/v2/networks/{}/metrics/validatorCount?subnetId={}&pageSize={}",
            self.base_url, network, subnet_id, PAGE_SIZE,
        );
        match self.series(&url).await {
            Ok(points) => second_most_recent(&points, MIN_COMPLETE_POINTS).map(|p| p.value),
            Err(err) => {
                warn!(%subnet_id, error = %err, "validator count fetch failed");
                metrics::counter!("chainpulse_source_failure", "source" => "validatorCount")
                    .increment(1);
                None
            }
        }
    }

    /// Fetches the full metric bundle for one chain, all metrics concurrently.
    pub async fn fetch_chain(&self, network: Network, chain: &ChainInfo) -> ChainMetrics {
        let (tx_count, daily, weekly, monthly, icm_messages, validator_count) = tokio::join!(
            self.chain_metric(&chain.id, MetricKind::TxCount, TimeInterval::Day),
            self.chain_metric(&chain.id, MetricKind::ActiveAddresses, TimeInterval::Day),
            self.chain_metric(&chain.id, MetricKind::ActiveAddresses, TimeInterval::Week),
            self.chain_metric(&chain.id, MetricKind::ActiveAddresses, TimeInterval::Month),
            self.icm_messages(&chain.id),
            self.subnet_validator_count(network, &chain.subnet_id),
        );

        ChainMetrics {
            chain_id: chain.id.clone(),
            chain_name: chain.name.clone(),
            logo: chain.logo.clone(),
            tx_count,
            daily_active_addresses: daily,
            weekly_active_addresses: weekly,
            monthly_active_addresses: monthly,
            icm_messages,
            validator_count,
        }
    }

    async fn series_or_empty(&self, url: &str, chain_id: &str, metric: &'static str) -> TimeSeriesMetric {
        match self.series(url).await {
            Ok(points) => TimeSeriesMetric::new(trim_incomplete_head(points, MIN_COMPLETE_POINTS)),
            Err(err) => {
                warn!(%chain_id, metric, error = %err, "metric fetch failed, returning empty series");
                metrics::counter!("chainpulse_source_failure", "source" => metric).increment(1);
                TimeSeriesMetric::default()
            }
        }
    }

    /// Fetches and sorts most-recent-first; callers apply the freshness
    /// policy to pick or trim to the last complete period.
    async fn series(&self, url: &str) -> Result<Vec<MetricPoint>> {
        let response: MetricSeriesResponse = fetch_with_retry(
            || async {
                let body = self
                    .http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok::<_, FetchError>(body)
            },
            "metric_series",
        )
        .await?;

        let mut points: Vec<MetricPoint> = response
            .results
            .into_iter()
            .map(|raw| MetricPoint::new(raw.timestamp, raw.value))
            .collect();
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_series_decodes_with_missing_values() {
        let body = r#"{"results":[{"timestamp":1704067200,"value":10},{"timestamp":1703980800}]}"#;
        let parsed: MetricSeriesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[1].value, 0);
    }

    #[test]
    fn empty_results_key_decodes_to_empty_series() {
        let parsed: MetricSeriesResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
