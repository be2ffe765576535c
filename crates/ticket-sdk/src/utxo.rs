use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

pub const LOVELACE: &str = "lovelace";

/// A reference to a transaction output: `tx_hash#index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_hash: String,
    pub index: u32,
}

impl OutputRef {
    pub fn new(tx_hash: impl Into<String>, index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            index,
        }
    }

    pub fn tx_hash_bytes(&self) -> Result<[u8; 32]> {
        let bytes = hex::decode(&self.tx_hash)
            .map_err(|e| Error::InvalidHex(format!("tx hash {}: {e}", self.tx_hash)))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidHex(format!("tx hash is {} bytes, expected 32", b.len()))
        })
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

/// One `(unit, quantity)` entry of a UTxO's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub unit: String,
    pub quantity: u64,
}

impl AssetAmount {
    pub fn new(unit: impl Into<String>, quantity: u64) -> Self {
        Self {
            unit: unit.into(),
            quantity,
        }
    }

    pub fn lovelace(quantity: u64) -> Self {
        Self::new(LOVELACE, quantity)
    }
}

/// Policy id + asset name, as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetUnit {
    pub policy_id: [u8; 28],
    pub asset_name: Vec<u8>,
}

impl AssetUnit {
    pub fn new(policy_id: [u8; 28], asset_name: impl Into<Vec<u8>>) -> Self {
        Self {
            policy_id,
            asset_name: asset_name.into(),
        }
    }

    /// Parse `policy_hex ++ name_hex`. Asset names are at most 32 bytes.
    pub fn parse(unit: &str) -> Result<Self> {
        if unit.len() < 56 || !unit.is_ascii() {
            return Err(Error::InvalidAsset(format!("{unit}: shorter than a policy id")));
        }
        let policy = hex::decode(&unit[..56])
            .map_err(|e| Error::InvalidAsset(format!("{unit}: {e}")))?;
        let asset_name =
            hex::decode(&unit[56..]).map_err(|e| Error::InvalidAsset(format!("{unit}: {e}")))?;
        if asset_name.len() > 32 {
            return Err(Error::InvalidAsset(format!("{unit}: asset name exceeds 32 bytes")));
        }
        let mut policy_id = [0u8; 28];
        policy_id.copy_from_slice(&policy);
        Ok(Self {
            policy_id,
            asset_name,
        })
    }

    pub fn to_unit(&self) -> String {
        format!("{}{}", hex::encode(self.policy_id), hex::encode(&self.asset_name))
    }
}

/// A spendable output as seen by the wallet or the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub out_ref: OutputRef,
    pub address: String,
    pub amount: Vec<AssetAmount>,
    /// Inline datum as hex CBOR.
    pub inline_datum: Option<String>,
    pub reference_script_hash: Option<String>,
}

impl Utxo {
    pub fn lovelace(&self) -> u64 {
        self.quantity_of(LOVELACE)
    }

    pub fn quantity_of(&self, unit: &str) -> u64 {
        self.amount
            .iter()
            .filter(|a| a.unit == unit)
            .map(|a| a.quantity)
            .sum()
    }

    /// True when the output holds lovelace and nothing else.
    pub fn is_pure_lovelace(&self) -> bool {
        self.amount
            .iter()
            .all(|a| a.unit == LOVELACE || a.quantity == 0)
            && self.lovelace() > 0
    }

    pub fn value(&self) -> Result<Value> {
        Value::from_amounts(&self.amount)
    }
}
