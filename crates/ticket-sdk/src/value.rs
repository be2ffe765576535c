use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utxo::{AssetAmount, AssetUnit, LOVELACE};

/// Asset name ordered the way canonical CBOR orders byte-string keys:
/// shorter names first, then bytewise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetName(pub Vec<u8>);

impl Ord for AssetName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for AssetName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub type MultiAsset = BTreeMap<[u8; 28], BTreeMap<AssetName, u64>>;

/// Lovelace plus native assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    pub coin: u64,
    pub assets: MultiAsset,
}

impl Value {
    pub fn lovelace(coin: u64) -> Self {
        Self {
            coin,
            assets: MultiAsset::new(),
        }
    }

    pub fn from_amounts(amounts: &[AssetAmount]) -> Result<Self> {
        let mut value = Value::default();
        for amount in amounts {
            if amount.unit == LOVELACE {
                value.coin = value
                    .coin
                    .checked_add(amount.quantity)
                    .ok_or(Error::ValueOverflow)?;
            } else {
                value.add_asset(&AssetUnit::parse(&amount.unit)?, amount.quantity)?;
            }
        }
        Ok(value)
    }

    pub fn add_asset(&mut self, unit: &AssetUnit, quantity: u64) -> Result<()> {
        if quantity == 0 {
            return Ok(());
        }
        let entry = self
            .assets
            .entry(unit.policy_id)
            .or_default()
            .entry(AssetName(unit.asset_name.clone()))
            .or_insert(0);
        *entry = entry.checked_add(quantity).ok_or(Error::ValueOverflow)?;
        Ok(())
    }

    pub fn with_asset(mut self, unit: &AssetUnit, quantity: u64) -> Result<Self> {
        self.add_asset(unit, quantity)?;
        Ok(self)
    }

    pub fn is_lovelace_only(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        let mut sum = self.clone();
        sum.coin = sum.coin.checked_add(other.coin).ok_or(Error::ValueOverflow)?;
        for (policy, names) in &other.assets {
            for (name, qty) in names {
                sum.add_asset(&AssetUnit::new(*policy, name.0.clone()), *qty)?;
            }
        }
        Ok(sum)
    }

    /// `self - other`, or `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let mut diff = self.clone();
        diff.coin = diff.coin.checked_sub(other.coin)?;
        for (policy, names) in &other.assets {
            for (name, qty) in names {
                if *qty == 0 {
                    continue;
                }
                let held = diff.assets.get_mut(policy)?.get_mut(name)?;
                *held = held.checked_sub(*qty)?;
            }
        }
        diff.assets.retain(|_, names| {
            names.retain(|_, qty| *qty > 0);
            !names.is_empty()
        });
        Some(diff)
    }
}
