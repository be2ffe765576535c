use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::script::PlutusVersion;

/// The slice of ledger protocol parameters needed to price one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolParameters {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub price_mem: f64,
    pub price_step: f64,
    pub coins_per_utxo_byte: u64,
    pub collateral_percent: u64,
    pub min_fee_ref_script_cost_per_byte: f64,
    pub cost_models: BTreeMap<PlutusVersion, Vec<i64>>,
}

impl ProtocolParameters {
    pub fn cost_model(&self, version: PlutusVersion) -> Result<&[i64]> {
        self.cost_models
            .get(&version)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                Error::ProtocolParameters(format!(
                    "no {} cost model",
                    version.cost_model_key()
                ))
            })
    }
}
