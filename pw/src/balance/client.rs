//! HTTP balance client for the chain indexer API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{BalanceError, BalanceLookup, ItemKind};
use crate::config::ApiConfig;

/// Smallest units per whole coin
pub const ATOMS_PER_COIN: i128 = 100_000_000_000;

/// Base delay between attempts, multiplied by the attempt number
const RETRY_STEP_MS: u64 = 500;

/// Client for `/api/v2/pool/{id}` and `/api/v2/delegation/{id}`
pub struct HttpBalanceClient {
    http: Client,
    base_url: String,
    max_attempts: u32,
}

impl HttpBalanceClient {
    pub fn from_config(config: &ApiConfig) -> Result<Self, BalanceError> {
        debug!(?config, "HttpBalanceClient::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::new(http, &config.base_url, config.max_attempts))
    }

    pub fn new(http: Client, base_url: &str, max_attempts: u32) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let base_url = if base_url.is_empty() {
            ApiConfig::default().base_url
        } else {
            base_url.to_string()
        };
        Self {
            http,
            base_url,
            max_attempts: max_attempts.max(1),
        }
    }

    fn url_for(&self, kind: ItemKind, id: &str) -> String {
        format!("{}/api/v2/{}/{}", self.base_url, kind.name(), id)
    }

    async fn fetch_once(&self, url: &str) -> Result<Value, BalanceError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        // Unknown ids answer with a 4xx JSON error body, which reads as a zero balance
        if status.is_server_error() {
            return Err(BalanceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BalanceError::InvalidResponse(format!("{url}: {e}")))
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Value, BalanceError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = Duration::from_millis(RETRY_STEP_MS * u64::from(attempt));
                    warn!(attempt, ?backoff, error = %e, "Balance lookup failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl BalanceLookup for HttpBalanceClient {
    async fn get_balance(&self, kind: ItemKind, id: &str) -> Result<i64, BalanceError> {
        debug!(%kind, %id, "get_balance: called");
        let url = self.url_for(kind, id);
        let body = self.fetch_with_retry(&url).await?;
        let atoms = extract_atoms(kind, &body)?;
        let coins = atoms_to_coins(atoms);
        debug!(%kind, %id, coins, "get_balance: complete");
        Ok(coins)
    }
}

/// JSON pointer of the atoms field for each kind
fn atoms_pointer(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Pool => "/staker_balance/atoms",
        ItemKind::Delegation => "/balance/atoms",
    }
}

/// Read the atoms amount; a missing field counts as zero
fn extract_atoms(kind: ItemKind, body: &Value) -> Result<i128, BalanceError> {
    match body.pointer(atoms_pointer(kind)) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(s)) => s
            .parse::<i128>()
            .map_err(|e| BalanceError::InvalidResponse(format!("atoms {s:?}: {e}"))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| BalanceError::InvalidResponse(format!("atoms {n} is not an integer"))),
        Some(other) => Err(BalanceError::InvalidResponse(format!("atoms has unexpected type: {other}"))),
    }
}

/// Convert atoms to whole coins, truncating toward zero
pub fn atoms_to_coins(atoms: i128) -> i64 {
    let coins = atoms / ATOMS_PER_COIN;
    i64::try_from(coins).unwrap_or(if coins < 0 { i64::MIN } else { i64::MAX })
}
