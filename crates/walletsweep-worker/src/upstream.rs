use anyhow::Context;
use std::time::Duration;
use walletsweep_core::{BlockRange, Error, Result, TransactionRecord};

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for the upstream transaction source.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    base_url: String,
    http: reqwest::Client,
}

impl UpstreamClient {
    /// `timeout` bounds the whole request, body included.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build upstream http client")
            .map_err(Error::Config)?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    /// `{base}/{chain_id}/{wallet}/{from}/{to}`
    pub fn transactions_url(&self, chain_id: &str, wallet: &str, range: &BlockRange) -> String {
        format!(
            "{}/{chain_id}/{wallet}/{}/{}",
            self.base_url.trim_end_matches('/'),
            range.from(),
            range.to()
        )
    }

    pub async fn fetch_transactions(
        &self,
        chain_id: &str,
        wallet: &str,
        range: &BlockRange,
    ) -> Result<Vec<TransactionRecord>> {
        let url = self.transactions_url(chain_id, wallet, range);
        let res: anyhow::Result<Vec<TransactionRecord>> = async {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .with_context(|| format!("GET {url}"))?;
            let resp = resp.error_for_status().context("upstream status")?;
            resp.json::<Vec<TransactionRecord>>()
                .await
                .context("decode transactions")
        }
        .await;
        res.map_err(Error::Fetch)
    }
}
