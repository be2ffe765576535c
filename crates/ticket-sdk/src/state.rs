use crate::chain::ChainIndexer;
use crate::datum::{DatumError, decode_counter_datum, encode_counter_datum};
use crate::error::{Error, Result};
use crate::params::TicketProtocol;
use crate::utxo::Utxo;

/// The shared ticket counter as found on-chain.
///
/// `counter` tickets have been issued so far; the next mint is named after
/// `counter` and leaves `counter + 1` on the recreated state UTxO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketState {
    pub utxo: Utxo,
    pub counter: i64,
}

impl TicketState {
    pub fn from_utxo(utxo: Utxo) -> Result<Self> {
        let datum = utxo
            .inline_datum
            .as_deref()
            .ok_or(Error::CounterUnreadable(DatumError::Missing))?;
        let counter = decode_counter_datum(datum).map_err(Error::CounterUnreadable)?;
        Ok(Self { utxo, counter })
    }

    pub fn next_counter(&self) -> i64 {
        self.counter + 1
    }

    /// Inline datum for the recreated state UTxO.
    pub fn next_datum(&self) -> Result<Vec<u8>> {
        encode_counter_datum(self.next_counter()).map_err(Error::CounterUnreadable)
    }

    pub fn ticket_name(&self, protocol: &TicketProtocol) -> String {
        format!("{}{}", protocol.ticket_name_prefix, self.counter)
    }
}

/// Locate the beacon-tagged state UTxO at the issuer address and decode its
/// counter. Not finding it is fatal for this attempt.
pub async fn read_ticket_state<I: ChainIndexer>(
    indexer: &I,
    protocol: &TicketProtocol,
) -> Result<TicketState> {
    let beacon = protocol.beacon_unit();
    let mut candidates = indexer
        .fetch_address_utxos(&protocol.issuer_address, Some(&beacon))
        .await?
        .into_iter()
        .filter(|u| u.quantity_of(&beacon) > 0);

    let utxo = candidates
        .next()
        .ok_or_else(|| Error::StateUtxoNotFound(protocol.issuer_address.clone()))?;
    let extra = candidates.count();
    if extra > 0 {
        log::warn!(
            "{extra} additional UTxOs carry the beacon at {}; using {}",
            protocol.issuer_address,
            utxo.out_ref
        );
    }

    let state = TicketState::from_utxo(utxo)?;
    log::info!(
        "ticket state at {}: current_counter={}, next_counter={}",
        state.utxo.out_ref,
        state.counter,
        state.next_counter()
    );
    Ok(state)
}
