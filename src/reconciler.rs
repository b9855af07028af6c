// src/reconciler.rs
use alloy::primitives::Address;
use rust_decimal::prelude::{FromStr, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::feeds::{InternalTxRow, NormalTxRow, TokenTxRow};
use crate::models::{TokenFlow, Transaction, TxStatus, NATIVE_SYMBOL};

const NATIVE_DECIMALS: u32 = 18;

pub(crate) fn parse_address(s: &str) -> Option<Address> {
    s.trim().parse::<Address>().ok()
}

fn is_wallet(addr: &str, wallet: &Address) -> bool {
    // unparseable addresses never match
    parse_address(addr).map_or(false, |a| a == *wallet)
}

/// Raw integer string scaled down by 10^decimals, as f64.
/// Decimal keeps full precision while the divisor fits u64; high-decimal
/// tokens and values past Decimal's range go through floats. Malformed
/// input degrades to 0.
fn scaled_amount(raw: &str, decimals: u32) -> f64 {
    let raw = raw.trim();
    if let Some(divisor) = 10u64.checked_pow(decimals) {
        if let Ok(v) = Decimal::from_str(raw) {
            return (v / Decimal::from(divisor)).to_f64().unwrap_or(0.0);
        }
    }
    raw.parse::<f64>()
        .map(|v| v / 10f64.powi(decimals.min(400) as i32))
        .unwrap_or(0.0)
}

fn native_amount(raw: &str) -> f64 {
    scaled_amount(raw, NATIVE_DECIMALS)
}

/// gasUsed * gasPrice scaled from wei to native units
fn gas_fee(gas_used: &str, gas_price: &str) -> f64 {
    let used = Decimal::from_str(gas_used.trim()).unwrap_or(Decimal::ZERO);
    let price = Decimal::from_str(gas_price.trim()).unwrap_or(Decimal::ZERO);
    let wei = Decimal::from(10u64.pow(NATIVE_DECIMALS));
    used.checked_mul(price)
        .map_or(0.0, |fee| (fee / wei).to_f64().unwrap_or(0.0))
}

fn parse_timestamp(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(0)
}

/// Merge the three transaction feeds of one wallet into unified per-hash
/// transactions, sorted descending by timestamp.
///
/// Normal transfers are processed first and are authoritative for gas and
/// status. Internal and token transfers accumulate flows into existing
/// records or create zero-gas "success" records for hashes the normal feed
/// never reported. Insertion order is kept for equal timestamps, so the
/// merge is deterministic.
pub fn reconcile(
    wallet: &Address,
    normal: &[NormalTxRow],
    internal: &[InternalTxRow],
    token: &[TokenTxRow],
) -> Vec<Transaction> {
    let mut txs: Vec<Transaction> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    // ---------------------------
    // Normal transfers
    // ---------------------------
    for row in normal {
        let i = *index.entry(row.hash.clone()).or_insert_with(|| {
            txs.push(Transaction {
                hash: row.hash.clone(),
                time_stamp: parse_timestamp(&row.time_stamp),
                from: row.from.clone(),
                to: row.to.clone(),
                value: row.value.clone(),
                gas_price: "0".to_string(),
                gas_used: "0".to_string(),
                status: TxStatus::Success,
                tokens: HashMap::new(),
                gas_fee: 0.0,
            });
            txs.len() - 1
        });
        let tx = &mut txs[i];

        let succeeded = row.is_error == "0";
        tx.gas_price = row.gas_price.clone();
        tx.gas_used = row.gas_used.clone();
        tx.status = if succeeded {
            TxStatus::Success
        } else {
            TxStatus::Failed
        };
        tx.gas_fee = gas_fee(&row.gas_used, &row.gas_price);

        // every normal transfer carries a native entry, even when zero
        let entry = tx.tokens.entry(NATIVE_SYMBOL.to_string()).or_default();
        let amount = native_amount(&row.value);
        if amount > 0.0 && succeeded {
            if is_wallet(&row.to, wallet) {
                entry.inflow += amount;
            } else if is_wallet(&row.from, wallet) {
                entry.outflow += amount;
            }
        }
    }

    // ---------------------------
    // Internal transfers
    // ---------------------------
    for row in internal {
        let incoming = is_wallet(&row.to, wallet);
        let outgoing = is_wallet(&row.from, wallet);
        if !incoming && !outgoing {
            continue;
        }
        let amount = native_amount(&row.value);

        if let Some(&i) = index.get(&row.hash) {
            // gas and status stay whatever the normal feed said
            let entry = txs[i].tokens.entry(NATIVE_SYMBOL.to_string()).or_default();
            if incoming {
                entry.inflow += amount;
            } else if outgoing {
                entry.outflow += amount;
            }
        } else {
            let mut tokens = HashMap::new();
            tokens.insert(
                NATIVE_SYMBOL.to_string(),
                TokenFlow {
                    inflow: if incoming { amount } else { 0.0 },
                    outflow: if outgoing { amount } else { 0.0 },
                    address: String::new(),
                },
            );
            index.insert(row.hash.clone(), txs.len());
            txs.push(Transaction {
                hash: row.hash.clone(),
                time_stamp: parse_timestamp(&row.time_stamp),
                from: row.from.clone(),
                to: row.to.clone(),
                value: row.value.clone(),
                gas_price: "0".to_string(),
                gas_used: "0".to_string(),
                status: TxStatus::Success,
                tokens,
                gas_fee: 0.0,
            });
        }
    }

    // ---------------------------
    // Token transfers
    // ---------------------------
    for row in token {
        let incoming = is_wallet(&row.to, wallet);
        let outgoing = is_wallet(&row.from, wallet);
        if !incoming && !outgoing {
            continue;
        }

        let symbol = if row.token_symbol.is_empty() {
            "Unknown".to_string()
        } else {
            row.token_symbol.clone()
        };
        let decimals = row.token_decimal.trim().parse::<u32>().unwrap_or(0);
        let amount = scaled_amount(&row.value, decimals);

        if let Some(&i) = index.get(&row.hash) {
            let entry = txs[i]
                .tokens
                .entry(symbol)
                .or_insert_with(|| TokenFlow {
                    inflow: 0.0,
                    outflow: 0.0,
                    address: row.contract_address.clone(),
                });
            if entry.address.is_empty() && !row.contract_address.is_empty() {
                entry.address = row.contract_address.clone();
            }
            // a self-transfer accumulates both sides
            if incoming {
                entry.inflow += amount;
            }
            if outgoing {
                entry.outflow += amount;
            }
        } else {
            let mut tokens = HashMap::new();
            tokens.insert(
                symbol,
                TokenFlow {
                    inflow: if incoming { amount } else { 0.0 },
                    outflow: if outgoing { amount } else { 0.0 },
                    address: row.contract_address.clone(),
                },
            );
            index.insert(row.hash.clone(), txs.len());
            txs.push(Transaction {
                hash: row.hash.clone(),
                time_stamp: parse_timestamp(&row.time_stamp),
                from: row.from.clone(),
                to: row.to.clone(),
                value: "0".to_string(),
                gas_price: "0".to_string(),
                gas_used: "0".to_string(),
                status: TxStatus::Success,
                tokens,
                gas_fee: 0.0,
            });
        }
    }

    txs.sort_by(|a, b| b.time_stamp.cmp(&a.time_stamp));
    txs
}
