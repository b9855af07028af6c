// src/service.rs
use alloy::primitives::Address;
use serde::Serialize;
use tracing::info;

use crate::aggregator;
use crate::feeds::{FeedClient, FeedError};
use crate::models::{Transaction, TransactionDay, TransactionStats};
use crate::prices::PriceCache;
use crate::reconciler;

/// Day-grouped trading report for one wallet, the shape the dashboard renders
#[derive(Debug, Serialize)]
pub struct WalletReport {
    pub address: String,
    pub summary: TransactionStats,
    pub days: Vec<TransactionDay>,
}

fn involves(tx: &Transaction, contract: &Address) -> bool {
    let matches = |s: &str| reconciler::parse_address(s).map_or(false, |a| a == *contract);
    matches(&tx.to) || matches(&tx.from)
}

/// Fetch the three feeds for a wallet, reconcile them, keep only traffic
/// with the target contract (when configured), cap the list, and enrich
/// each day bucket plus the overall summary with statistics.
///
/// Feed failures propagate; price failures inside the statistics pass have
/// already degraded to 0 and never surface here.
pub async fn wallet_report(
    feeds: &FeedClient,
    prices: &PriceCache,
    wallet: &Address,
    target_contract: Option<&Address>,
    max_transactions: usize,
) -> Result<WalletReport, FeedError> {
    let address = wallet.to_string().to_lowercase();

    let normal = feeds.normal_transfers(&address).await?;
    let internal = feeds.internal_transfers(&address).await?;
    let token = feeds.token_transfers(&address).await?;
    info!(
        "Feeds for {}: {} normal / {} internal / {} token",
        address,
        normal.len(),
        internal.len(),
        token.len()
    );

    let mut transactions = reconciler::reconcile(wallet, &normal, &internal, &token);
    if let Some(contract) = target_contract {
        transactions.retain(|tx| involves(tx, contract));
    }
    transactions.truncate(max_transactions);

    let mut days = aggregator::group_by_day(&transactions);
    for day in &mut days {
        let stats = aggregator::compute_statistics(&day.transactions, prices).await;
        day.apply_stats(stats);
    }
    let summary = aggregator::compute_statistics(&transactions, prices).await;

    info!(
        "Report for {}: {} transactions over {} days",
        address,
        summary.transaction_count,
        days.len()
    );

    Ok(WalletReport {
        address,
        summary,
        days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TokenFlow, TxStatus};
    use std::collections::HashMap;

    fn tx(hash: &str, from: &str, to: &str) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            time_stamp: 0,
            from: from.to_string(),
            to: to.to_string(),
            value: "0".to_string(),
            gas_price: "0".to_string(),
            gas_used: "0".to_string(),
            status: TxStatus::Success,
            tokens: HashMap::<String, TokenFlow>::new(),
            gas_fee: 0.0,
        }
    }

    #[test]
    fn target_contract_filter_matches_either_side_case_insensitively() {
        let contract: Address = "0xb300000b72DEAEb607a12d5f54773D1C19c7028d"
            .parse()
            .unwrap();
        let wallet = "0x1111111111111111111111111111111111111111";

        assert!(involves(
            &tx("0xA", wallet, "0xb300000b72deaeb607a12d5f54773d1c19c7028d"),
            &contract
        ));
        assert!(involves(
            &tx("0xB", "0xB300000B72DEAEB607A12D5F54773D1C19C7028D", wallet),
            &contract
        ));
        assert!(!involves(
            &tx("0xC", wallet, "0x2222222222222222222222222222222222222222"),
            &contract
        ));
        assert!(!involves(&tx("0xD", "not-an-address", ""), &contract));
    }
}
