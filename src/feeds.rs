// src/feeds.rs
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("unexpected feed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

fn no_error() -> String {
    "0".to_string()
}

/// Raw row from the `txlist` feed (normal transfers).
/// All numeric fields arrive as decimal strings; missing fields default
/// so partial rows never abort a query.
#[derive(Debug, Clone, Deserialize)]
pub struct NormalTxRow {
    #[serde(default)]
    pub hash: String,
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "gasPrice", default)]
    pub gas_price: String,
    #[serde(rename = "gasUsed", default)]
    pub gas_used: String,
    #[serde(rename = "isError", default = "no_error")]
    pub is_error: String,
}

/// Raw row from the `txlistinternal` feed
#[derive(Debug, Clone, Deserialize)]
pub struct InternalTxRow {
    #[serde(default)]
    pub hash: String,
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
}

/// Raw row from the `tokentx` feed (ERC20-style transfers)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTxRow {
    #[serde(default)]
    pub hash: String,
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "tokenSymbol", default)]
    pub token_symbol: String,
    #[serde(rename = "tokenDecimal", default)]
    pub token_decimal: String,
    #[serde(rename = "contractAddress", default)]
    pub contract_address: String,
}

/// Client for an Etherscan-compatible account API (BscScan)
pub struct FeedClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FeedClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn normal_transfers(&self, address: &str) -> Result<Vec<NormalTxRow>, FeedError> {
        self.fetch_action("txlist", address).await
    }

    pub async fn internal_transfers(&self, address: &str) -> Result<Vec<InternalTxRow>, FeedError> {
        self.fetch_action("txlistinternal", address).await
    }

    pub async fn token_transfers(&self, address: &str) -> Result<Vec<TokenTxRow>, FeedError> {
        self.fetch_action("tokentx", address).await
    }

    /// Fetch one account action. `status == "1"` carries rows; an empty
    /// account answers `status == "0"` with "No transactions found", which
    /// is not an error. Transport failures propagate to the caller.
    async fn fetch_action<T: DeserializeOwned>(
        &self,
        action: &str,
        address: &str,
    ) -> Result<Vec<T>, FeedError> {
        let url = format!(
            "{}?module=account&action={}&address={}&startblock=0&endblock=99999999&sort=desc&apikey={}",
            self.base_url, action, address, self.api_key
        );

        info!("📡 Fetching {} for {}", action, address);

        let resp = self.client.get(&url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(FeedError::Status(resp.status()));
        }

        let body: serde_json::Value = resp.json().await?;
        let status = body["status"].as_str().unwrap_or_default();
        let message = body["message"].as_str().unwrap_or_default();

        if status == "1" {
            let rows: Vec<T> = serde_json::from_value(body["result"].clone())?;
            info!("Fetched {} rows for {}", rows.len(), action);
            Ok(rows)
        } else if message == "No transactions found" {
            Ok(Vec::new())
        } else {
            warn!("Feed API error for {}: {}", action, message);
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_with_missing_fields_deserialize_to_defaults() {
        let row: NormalTxRow = serde_json::from_value(json!({ "hash": "0xabc" })).unwrap();
        assert_eq!(row.hash, "0xabc");
        assert_eq!(row.value, "");
        assert_eq!(row.is_error, "0"); // absent error flag means not errored

        let row: TokenTxRow = serde_json::from_value(json!({
            "hash": "0xdef",
            "tokenSymbol": "CAKE"
        }))
        .unwrap();
        assert_eq!(row.token_symbol, "CAKE");
        assert_eq!(row.token_decimal, "");
    }

    #[test]
    fn feed_field_names_match_the_upstream_shape() {
        let row: NormalTxRow = serde_json::from_value(json!({
            "hash": "0xA",
            "timeStamp": "1700000000",
            "from": "0x1",
            "to": "0x2",
            "value": "1000000000000000000",
            "gasPrice": "5000000000",
            "gasUsed": "21000",
            "isError": "1"
        }))
        .unwrap();
        assert_eq!(row.time_stamp, "1700000000");
        assert_eq!(row.gas_price, "5000000000");
        assert_eq!(row.gas_used, "21000");
        assert_eq!(row.is_error, "1");
    }
}
