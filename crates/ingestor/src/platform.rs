use crate::{
    error::{FetchError, Result, fetch_with_retry},
    types::{Network, ValidatorRecord},
};
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatorPage {
    #[serde(default)]
    validators: Vec<RawValidator>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// A validator row from either listing variant. The classic listing reports
/// `amountStaked` as a decimal string, the L1 listing a numeric `weight`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawValidator {
    node_id: String,
    subnet_id: String,
    #[serde(default)]
    amount_staked: Option<String>,
    #[serde(default)]
    weight: Option<u64>,
}

impl RawValidator {
    fn into_record(self, is_l1: bool) -> Option<ValidatorRecord> {
        let weight = self
            .weight
            .or_else(|| self.amount_staked.as_deref().and_then(|s| s.parse().ok()))?;
        Some(ValidatorRecord {
            node_id: self.node_id,
            subnet_id: self.subnet_id,
            weight,
            is_l1,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    node_id: String,
    version: String,
}

/// Client for the validator-listing API and the client-version feed.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    version_feed_url: String,
}

impl PlatformClient {
    pub fn new(
        base_url: &str,
        version_feed_url: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            version_feed_url: version_feed_url.to_string(),
        })
    }

    /// Full validator set for a network: the classic listing followed by the
    /// weight-based L1 listing. The two listings are disjoint upstream.
    pub async fn validators(&self, network: Network) -> Result<Vec<ValidatorRecord>> {
        let mut records = self.paged_listing(network, "validators", false).await?;
        let l1 = self.paged_listing(network, "l1Validators", true).await?;
        records.extend(l1);

        info!(%network, count = records.len(), "fetched validator set");
        Ok(records)
    }

    /// Node-id to client-version map for a network.
    pub async fn client_versions(&self, network: Network) -> Result<HashMap<String, String>> {
        let url = format!("{}?network={}", self.version_feed_url, network);
        let entries: Vec<VersionEntry> = fetch_with_retry(
            || async {
                let body = self
                    .http
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok::<_, FetchError>(body)
            },
            "client_versions",
        )
        .await?;

        Ok(entries
            .into_iter()
            .map(|entry| (entry.node_id, entry.version))
            .collect())
    }

    async fn paged_listing(
        &self,
        network: Network,
        path: &'static str,
        is_l1: bool,
    ) -> Result<Vec<ValidatorRecord>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/v2/networks/{}/{}?pageSize={}",
                self.base_url, network, path, PAGE_SIZE,
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }

            let page: ValidatorPage = fetch_with_retry(
                || async {
                    let body = self
                        .http
                        .get(&url)
                        .send()
                        .await?
                        .error_for_status()?
                        .json()
                        .await?;
                    Ok::<_, FetchError>(body)
                },
                path,
            )
            .await?;

            for raw in page.validators {
                match raw.into_record(is_l1) {
                    Some(record) => records.push(record),
                    None => debug!(listing = path, "skipping validator row without stake"),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }
}
