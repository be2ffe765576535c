use crate::error::Result;
use crate::params::ExUnits;
use crate::protocol::ProtocolParameters;
use crate::tx::TxOut;

/// Bytes the ledger adds to every output when pricing its minimum ADA.
pub const MIN_UTXO_OVERHEAD: u64 = 160;

/// Reference-script bytes are priced in tiers of this size, each tier
/// costing 1.2x the previous per byte.
pub const REF_SCRIPT_TIER_SIZE: u64 = 25_600;
const REF_SCRIPT_TIER_NUM: u128 = 6;
const REF_SCRIPT_TIER_DEN: u128 = 5;

/// Fractional prices are carried as integers scaled by this factor so the
/// final rounding happens once, on exact values.
const PRICE_SCALE: u128 = 10_000_000_000;

fn scaled(price: f64) -> u128 {
    (price * PRICE_SCALE as f64).round().max(0.0) as u128
}

fn saturate(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// `min_fee_a * size + min_fee_b`.
pub fn linear_fee(params: &ProtocolParameters, tx_size: usize) -> u64 {
    params
        .min_fee_a
        .saturating_mul(tx_size as u64)
        .saturating_add(params.min_fee_b)
}

/// Price of the declared execution budgets, rounded up.
pub fn execution_fee(params: &ProtocolParameters, budgets: &[ExUnits]) -> u64 {
    let mem: u128 = budgets.iter().map(|b| u128::from(b.mem)).sum();
    let steps: u128 = budgets.iter().map(|b| u128::from(b.steps)).sum();
    let total = mem * scaled(params.price_mem) + steps * scaled(params.price_step);
    saturate(total.div_ceil(PRICE_SCALE))
}

/// Tiered fee for reference scripts touched by the transaction, rounded down.
pub fn reference_script_fee(params: &ProtocolParameters, script_size: usize) -> u64 {
    let mut remaining = script_size as u128;
    let mut tier_price = scaled(params.min_fee_ref_script_cost_per_byte);
    let tier = u128::from(REF_SCRIPT_TIER_SIZE);
    let mut acc: u128 = 0;
    while remaining >= tier {
        acc += tier * tier_price;
        tier_price = tier_price * REF_SCRIPT_TIER_NUM / REF_SCRIPT_TIER_DEN;
        remaining -= tier;
    }
    acc += remaining * tier_price;
    saturate(acc / PRICE_SCALE)
}

/// Smallest coin an output may carry: `(160 + size) * coins_per_utxo_byte`.
pub fn min_ada(params: &ProtocolParameters, output: &TxOut) -> Result<u64> {
    let size = output.encode()?.len() as u64;
    Ok((MIN_UTXO_OVERHEAD + size).saturating_mul(params.coins_per_utxo_byte))
}

/// Collateral the ledger demands for `fee`: `ceil(fee * percent / 100)`.
pub fn total_collateral(fee: u64, collateral_percent: u64) -> u64 {
    saturate((u128::from(fee) * u128::from(collateral_percent)).div_ceil(100))
}
