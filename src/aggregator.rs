// src/aggregator.rs
use std::collections::HashMap;

use crate::models::{
    TokenFlow, Transaction, TransactionDay, TransactionStats, NATIVE_SYMBOL, STABLE_SYMBOL,
};
use crate::prices::PriceCache;

fn day_key(time_stamp: i64) -> String {
    chrono::DateTime::from_timestamp(time_stamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

fn accumulate(stats: &mut HashMap<String, TokenFlow>, symbol: &str, flow: &TokenFlow) {
    let entry = stats.entry(symbol.to_string()).or_insert_with(|| TokenFlow {
        inflow: 0.0,
        outflow: 0.0,
        address: flow.address.clone(),
    });
    // first non-empty contract address wins
    if entry.address.is_empty() && !flow.address.is_empty() {
        entry.address = flow.address.clone();
    }
    entry.inflow += flow.inflow;
    entry.outflow += flow.outflow;
}

/// Partition transactions into UTC calendar-day buckets with per-symbol
/// rollups, sorted descending by date. Buckets are disjoint and exhaustive
/// over the input.
pub fn group_by_day(transactions: &[Transaction]) -> Vec<TransactionDay> {
    let mut days: Vec<TransactionDay> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for tx in transactions {
        let date = day_key(tx.time_stamp);
        let i = *index.entry(date.clone()).or_insert_with(|| {
            days.push(TransactionDay::new(date.clone()));
            days.len() - 1
        });
        let day = &mut days[i];

        day.transactions.push(tx.clone());
        day.transaction_count += 1;
        day.total_gas += tx.gas_fee;
        for (symbol, flow) in &tx.tokens {
            accumulate(&mut day.token_stats, symbol, flow);
        }
    }

    days.sort_by(|a, b| b.date.cmp(&a.date));
    days
}

/// Coarse log2 score: one point per doubling of stable-coin volume,
/// clamped to 0 for values of 1 or below
pub fn calculate_points(value: f64) -> u32 {
    if value <= 0.0 {
        return 0;
    }
    let points = value.log2().floor();
    if points > 0.0 {
        points as u32
    } else {
        0
    }
}

/// Aggregate financial metrics over any set of transactions. Token totals
/// are recomputed from scratch so the calculator composes over arbitrary
/// subsets (one day, one week, everything).
pub async fn compute_statistics(
    transactions: &[Transaction],
    prices: &PriceCache,
) -> TransactionStats {
    let mut token_stats: HashMap<String, TokenFlow> = HashMap::new();
    let mut total_gas = 0.0;

    for tx in transactions {
        total_gas += tx.gas_fee;
        for (symbol, flow) in &tx.tokens {
            accumulate(&mut token_stats, symbol, flow);
        }
    }

    let native_price = prices.fetch_price(NATIVE_SYMBOL).await;
    let stable = token_stats.get(STABLE_SYMBOL);
    let total_value = stable.map_or(0.0, |f| f.inflow + f.outflow);
    let total_loss = stable.map_or(0.0, |f| f.inflow - f.outflow);
    let total_gas_usd = total_gas * native_price;
    let total_points = calculate_points(total_value);
    // gas is folded into the loss only when the stable leg already nets out
    // negative; a net-gain set keeps 0 here
    let total_loss_with_gas = if total_loss < 0.0 {
        -(total_loss.abs() + total_gas_usd)
    } else {
        0.0
    };

    TransactionStats {
        total_gas,
        total_value,
        total_loss,
        total_loss_with_gas,
        total_points,
        total_gas_usd,
        token_stats,
        transaction_count: transactions.len(),
    }
}
