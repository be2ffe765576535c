use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::params::TicketProtocol;
use crate::utxo::Utxo;
use crate::value::Value;

pub fn total_lovelace(utxos: &[Utxo]) -> u64 {
    utxos.iter().map(Utxo::lovelace).fold(0u64, u64::saturating_add)
}

/// Ticket price at `now`. Evaluated when the draft is built, so an attempt
/// that straddles the cutoff pays whichever price applies at build time.
pub fn ticket_price(now: DateTime<Utc>, protocol: &TicketProtocol) -> u64 {
    if now < protocol.price_cutoff {
        protocol.price_before_cutoff
    } else {
        protocol.price_after_cutoff
    }
}

/// Refuse early when the wallet cannot cover the price plus the buffer.
pub fn check_balance(utxos: &[Utxo], price: u64, buffer: u64) -> Result<u64> {
    let required = price.checked_add(buffer).ok_or(Error::ValueOverflow)?;
    let available = total_lovelace(utxos);
    if available < required {
        return Err(Error::InsufficientBalance {
            required,
            available,
        });
    }
    Ok(available)
}

/// Pick the smallest lovelace-only UTxO that clears `minimum`. The first one
/// wins among equals.
pub fn select_collateral(utxos: &[Utxo], minimum: u64) -> Result<Utxo> {
    let pure: Vec<&Utxo> = utxos.iter().filter(|u| u.is_pure_lovelace()).collect();
    if pure.is_empty() {
        return Err(Error::NoPureLovelaceUtxo);
    }

    // min_by_key keeps the first of equal keys
    pure.iter()
        .filter(|u| u.lovelace() > minimum)
        .min_by_key(|u| u.lovelace())
        .map(|u| (*u).clone())
        .ok_or_else(|| Error::CollateralBelowMinimum {
            minimum,
            largest: pure.iter().map(|u| u.lovelace()).max().unwrap_or(0),
        })
}

/// Result of choosing wallet inputs for a target value.
#[derive(Debug, Clone)]
pub struct InputSelection {
    pub inputs: Vec<Utxo>,
    /// Everything selected beyond the target; becomes the change output.
    pub change: Value,
}

/// Largest-first selection over `candidates` until the selected value covers
/// `target` and leaves change worth at least `min_change(change)` lovelace
/// (or exactly nothing).
pub fn select_inputs<F>(candidates: &[Utxo], target: &Value, min_change: F) -> Result<InputSelection>
where
    F: Fn(&Value) -> u64,
{
    let mut ordered: Vec<&Utxo> = candidates.iter().collect();
    ordered.sort_by(|a, b| b.lovelace().cmp(&a.lovelace()));

    let mut inputs = Vec::new();
    let mut selected = Value::default();
    for utxo in ordered {
        selected = selected.checked_add(&utxo.value()?)?;
        inputs.push(utxo.clone());

        if let Some(change) = selected.checked_sub(target) {
            let empty = change.coin == 0 && change.is_lovelace_only();
            if empty || change.coin >= min_change(&change) {
                return Ok(InputSelection { inputs, change });
            }
        }
    }

    Err(Error::InsufficientInputs(format!(
        "wallet UTxOs hold {} lovelace, need {} plus change",
        selected.coin, target.coin
    )))
}
