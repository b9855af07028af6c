// src/models.rs
use serde::Serialize;
use std::collections::HashMap;

/// Synthetic symbol for the chain's native coin
pub const NATIVE_SYMBOL: &str = "BNB";

/// USD-pegged token whose flow is the proxy for trade value
pub const STABLE_SYMBOL: &str = "BSC-USD";

/// Cumulative movement of one token symbol within a transaction or a day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenFlow {
    pub inflow: f64,
    pub outflow: f64,
    pub address: String, // contract address, empty for native
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

/// One on-chain transaction reconstructed from up to three feed rows
/// sharing a hash (normal, internal and token transfers)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub time_stamp: i64,
    pub from: String,
    pub to: String,
    pub value: String, // native amount in wei, as reported by the feed
    pub gas_price: String,
    pub gas_used: String,
    pub status: TxStatus,
    pub tokens: HashMap<String, TokenFlow>,
    pub gas_fee: f64, // native units
}

/// Aggregate financial metrics over a set of transactions
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub total_gas: f64,
    pub total_value: f64,
    pub total_loss: f64,
    pub total_loss_with_gas: f64,
    pub total_points: u32,
    pub total_gas_usd: f64,
    pub token_stats: HashMap<String, TokenFlow>,
    pub transaction_count: usize,
}

/// All transactions of one UTC calendar day, plus per-day rollups
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDay {
    pub date: String, // YYYY-MM-DD
    pub token_stats: HashMap<String, TokenFlow>,
    pub transactions: Vec<Transaction>,
    pub total_gas: f64,
    pub total_value: f64,
    pub total_loss: f64,
    pub total_loss_with_gas: f64,
    pub total_points: u32,
    pub total_gas_usd: f64,
    pub transaction_count: usize,
}

impl TransactionDay {
    pub fn new(date: String) -> Self {
        Self {
            date,
            token_stats: HashMap::new(),
            transactions: Vec::new(),
            total_gas: 0.0,
            total_value: 0.0,
            total_loss: 0.0,
            total_loss_with_gas: 0.0,
            total_points: 0,
            total_gas_usd: 0.0,
            transaction_count: 0,
        }
    }

    /// Fill the financial fields from a computed statistics block
    pub fn apply_stats(&mut self, stats: TransactionStats) {
        self.total_gas = stats.total_gas;
        self.total_value = stats.total_value;
        self.total_loss = stats.total_loss;
        self.total_loss_with_gas = stats.total_loss_with_gas;
        self.total_points = stats.total_points;
        self.total_gas_usd = stats.total_gas_usd;
        self.token_stats = stats.token_stats;
        self.transaction_count = stats.transaction_count;
    }
}
