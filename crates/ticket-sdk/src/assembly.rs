use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::params::TicketProtocol;
use crate::protocol::ProtocolParameters;
use crate::script::ScriptReference;
use crate::selection::{InputSelection, select_inputs, ticket_price};
use crate::state::TicketState;
use crate::tx::fee::{execution_fee, linear_fee, min_ada, reference_script_fee, total_collateral};
use crate::tx::{
    Redeemer, RedeemerTag, TxBody, TxIn, TxOut, WitnessSet, encode_redeemers,
    encode_transaction, language_views, script_data_hash, transaction_id,
};
use crate::utxo::{OutputRef, Utxo};
use crate::value::Value;

/// Upper bound on fee re-estimation rounds before giving up.
const MAX_FEE_ROUNDS: usize = 8;

/// All inputs needed to assemble a ticket purchase (before signing).
#[derive(Debug, Clone)]
pub struct PurchaseAssemblyInputs {
    pub protocol: TicketProtocol,
    pub network: Network,
    pub params: ProtocolParameters,
    pub state: TicketState,
    pub script: ScriptReference,
    /// Spendable wallet UTxOs, collateral included.
    pub wallet_utxos: Vec<Utxo>,
    pub collateral: Utxo,
    pub change_address: Address,
    pub now: DateTime<Utc>,
}

/// An unsigned purchase transaction ready for the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftTransaction {
    pub bytes: Vec<u8>,
    pub tx_id: String,
    pub fee: u64,
    pub price: u64,
    pub ticket_name: String,
    pub current_counter: i64,
    pub next_counter: i64,
    pub ttl: u64,
    /// Wallet UTxOs spent alongside the state UTxO.
    pub wallet_inputs: Vec<OutputRef>,
    pub collateral: OutputRef,
}

impl DraftTransaction {
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Compose the purchase: spend the state UTxO, mint the next ticket, pay
/// the treasury and send change home. Every failure surfaces as
/// [`Error::DraftBuild`] so the caller never asks the wallet to sign a
/// half-built transaction.
pub fn assemble_ticket_purchase(inputs: &PurchaseAssemblyInputs) -> Result<DraftTransaction> {
    compose(inputs).map_err(|e| match e {
        Error::DraftBuild(_) => e,
        other => Error::DraftBuild(other.to_string()),
    })
}

/// Outputs and fixed parts shared by every fee round.
struct Skeleton {
    state_in: TxIn,
    script_in: TxIn,
    collateral_in: TxIn,
    outputs: Vec<TxOut>,
    mint: Value,
    ttl: u64,
    language_views: Vec<u8>,
    fixed_fee: u64,
}

struct Round {
    body: TxBody,
    redeemers: Vec<Redeemer>,
    selection: InputSelection,
}

fn compose(inputs: &PurchaseAssemblyInputs) -> Result<DraftTransaction> {
    let protocol = &inputs.protocol;
    let params = &inputs.params;
    let price = ticket_price(inputs.now, protocol);
    let ticket_name = inputs.state.ticket_name(protocol);
    let skeleton = skeleton(inputs, price, &ticket_name)?;

    let candidates: Vec<Utxo> = inputs
        .wallet_utxos
        .iter()
        .filter(|u| u.out_ref != inputs.state.utxo.out_ref && u.out_ref != inputs.collateral.out_ref)
        .cloned()
        .collect();

    let mut fee = linear_fee(params, 0).saturating_add(skeleton.fixed_fee);
    for round in 1..=MAX_FEE_ROUNDS {
        let built = build_round(inputs, &skeleton, &candidates, price, fee)?;
        let body_bytes = built.body.encode()?;

        let required = linear_fee(params, signed_size(&built, &body_bytes, &inputs.collateral)?)
            .saturating_add(skeleton.fixed_fee);
        log::debug!("fee round {round}: declared {fee}, required {required}");
        if required > fee {
            fee = required;
            continue;
        }

        let witnesses = WitnessSet {
            vkeys: Vec::new(),
            redeemers: built.redeemers,
        };
        let bytes = encode_transaction(&body_bytes, &witnesses.encode()?, true, None)?;
        let draft = DraftTransaction {
            bytes,
            tx_id: hex::encode(transaction_id(&body_bytes)),
            fee,
            price,
            ticket_name,
            current_counter: inputs.state.counter,
            next_counter: inputs.state.next_counter(),
            ttl: skeleton.ttl,
            wallet_inputs: built.selection.inputs.iter().map(|u| u.out_ref.clone()).collect(),
            collateral: inputs.collateral.out_ref.clone(),
        };
        log::info!(
            "draft {} for {}: fee={}, price={}, ttl={}, wallet_inputs={}",
            draft.tx_id,
            draft.ticket_name,
            draft.fee,
            draft.price,
            draft.ttl,
            draft.wallet_inputs.len()
        );
        return Ok(draft);
    }

    Err(Error::DraftBuild(format!(
        "fee did not settle after {MAX_FEE_ROUNDS} rounds"
    )))
}

fn skeleton(inputs: &PurchaseAssemblyInputs, price: u64, ticket_name: &str) -> Result<Skeleton> {
    let protocol = &inputs.protocol;
    let params = &inputs.params;
    let ticket = protocol.ticket_unit(ticket_name)?;
    let issuer = Address::parse(&protocol.issuer_address)?;
    let treasury = Address::parse(&protocol.treasury_address)?;

    let mut buyer_out = TxOut::new(
        &inputs.change_address,
        Value::lovelace(protocol.buyer_output_lovelace).with_asset(&ticket, 1)?,
    );
    let floor = min_ada(params, &buyer_out)?;
    if buyer_out.value.coin < floor {
        log::warn!(
            "buyer output raised from {} to the {floor} lovelace minimum",
            buyer_out.value.coin
        );
        buyer_out.value.coin = floor;
    }

    let state_out = TxOut::new(&issuer, inputs.state.utxo.value()?)
        .with_inline_datum(inputs.state.next_datum()?);
    let treasury_out = TxOut::new(&treasury, Value::lovelace(price));

    let cost_model = params.cost_model(inputs.script.version)?;
    let fixed_fee = execution_fee(params, &[protocol.spend_ex_units, protocol.mint_ex_units])
        .saturating_add(reference_script_fee(params, inputs.script.size));

    Ok(Skeleton {
        state_in: TxIn::from_out_ref(&inputs.state.utxo.out_ref)?,
        script_in: TxIn::from_out_ref(&inputs.script.out_ref)?,
        collateral_in: TxIn::from_out_ref(&inputs.collateral.out_ref)?,
        outputs: vec![buyer_out, state_out, treasury_out],
        mint: Value::default().with_asset(&ticket, 1)?,
        ttl: inputs
            .network
            .unix_to_slot(inputs.now.timestamp() + protocol.validity_window_secs),
        language_views: language_views(inputs.script.version, cost_model)?,
        fixed_fee,
    })
}

/// Choose wallet inputs for `fee`. The collateral UTxO is only spent when
/// the rest of the wallet cannot cover the purchase.
fn select_funding(
    inputs: &PurchaseAssemblyInputs,
    candidates: &[Utxo],
    target: &Value,
) -> Result<InputSelection> {
    let change_floor = |change: &Value| {
        min_ada(
            &inputs.params,
            &TxOut::new(&inputs.change_address, change.clone()),
        )
        .unwrap_or(u64::MAX)
    };

    match select_inputs(candidates, target, change_floor) {
        Ok(selection) => Ok(selection),
        Err(Error::InsufficientInputs(_)) => {
            let mut widened = candidates.to_vec();
            widened.push(inputs.collateral.clone());
            log::debug!("spending collateral {} as a regular input", inputs.collateral.out_ref);
            select_inputs(&widened, target, change_floor)
        }
        Err(e) => Err(e),
    }
}

fn build_round(
    inputs: &PurchaseAssemblyInputs,
    skeleton: &Skeleton,
    candidates: &[Utxo],
    price: u64,
    fee: u64,
) -> Result<Round> {
    let protocol = &inputs.protocol;
    let buyer_coin = skeleton.outputs[0].value.coin;
    let spend = buyer_coin
        .checked_add(price)
        .and_then(|v| v.checked_add(fee))
        .ok_or(Error::ValueOverflow)?;
    let selection = select_funding(inputs, candidates, &Value::lovelace(spend))?;

    let mut body = TxBody {
        fee,
        ttl: skeleton.ttl,
        mint: skeleton.mint.assets.clone(),
        outputs: skeleton.outputs.clone(),
        ..TxBody::default()
    };
    body.inputs.insert(skeleton.state_in);
    for utxo in &selection.inputs {
        body.inputs.insert(TxIn::from_out_ref(&utxo.out_ref)?);
    }
    if selection.change != Value::default() {
        body.outputs
            .push(TxOut::new(&inputs.change_address, selection.change.clone()));
    }
    body.reference_inputs.insert(skeleton.script_in);

    body.collateral.insert(skeleton.collateral_in);
    let required = total_collateral(fee, inputs.params.collateral_percent);
    let offered = inputs.collateral.lovelace();
    let returned = offered.checked_sub(required).ok_or_else(|| {
        Error::DraftBuild(format!(
            "collateral {} holds {offered} lovelace, {required} required",
            inputs.collateral.out_ref
        ))
    })?;
    let collateral_return = TxOut::new(&inputs.change_address, Value::lovelace(returned));
    if returned > 0 && returned >= min_ada(&inputs.params, &collateral_return)? {
        body.collateral_return = Some(collateral_return);
        body.total_collateral = Some(required);
    } else {
        // Too little left to return: forfeit the whole UTxO.
        body.total_collateral = Some(offered);
    }

    let spend_index = body
        .input_index(&skeleton.state_in)
        .ok_or_else(|| Error::DraftBuild("state input missing from body".into()))?;
    // One minting policy, so its redeemer points at index 0.
    let redeemers = vec![
        Redeemer::unit(RedeemerTag::Spend, spend_index, protocol.spend_ex_units),
        Redeemer::unit(RedeemerTag::Mint, 0, protocol.mint_ex_units),
    ];
    body.script_data_hash = Some(script_data_hash(
        &encode_redeemers(&redeemers)?,
        &skeleton.language_views,
    ));

    Ok(Round {
        body,
        redeemers,
        selection,
    })
}

/// Size of the transaction once the wallet has added one vkey witness per
/// distinct paying address.
fn signed_size(round: &Round, body_bytes: &[u8], collateral: &Utxo) -> Result<usize> {
    let signers: BTreeSet<&str> = round
        .selection
        .inputs
        .iter()
        .chain(std::iter::once(collateral))
        .map(|u| u.address.as_str())
        .collect();
    let placeholder = WitnessSet {
        vkeys: vec![([0u8; 32], [0u8; 64]); signers.len()],
        redeemers: round.redeemers.clone(),
    };
    Ok(encode_transaction(body_bytes, &placeholder.encode()?, true, None)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        BUYER_ADDRESS, protocol_parameters, pure_utxo, script_reference, state_utxo,
    };
    use chrono::TimeZone;

    fn inputs(wallet: Vec<Utxo>, collateral: Utxo) -> PurchaseAssemblyInputs {
        let protocol = TicketProtocol::mainnet();
        PurchaseAssemblyInputs {
            state: TicketState::from_utxo(state_utxo(&protocol, 41)).unwrap(),
            script: script_reference(&protocol),
            protocol,
            network: Network::Mainnet,
            params: protocol_parameters(),
            wallet_utxos: wallet,
            collateral,
            change_address: Address::parse(BUYER_ADDRESS).unwrap(),
            now: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn draft_carries_ticket_counter_and_ttl() {
        let collateral = pure_utxo(0xc0, 0, 6_000_000);
        let wallet = vec![pure_utxo(0xa0, 0, 444_000_000), collateral.clone()];
        let draft = assemble_ticket_purchase(&inputs(wallet, collateral)).unwrap();

        assert_eq!(draft.ticket_name, "TICKET41");
        assert_eq!(draft.current_counter, 41);
        assert_eq!(draft.next_counter, 42);
        assert_eq!(draft.price, 400_000_000);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            draft.ttl,
            Network::Mainnet.unix_to_slot(now.timestamp() + 7200)
        );
        assert_eq!(draft.wallet_inputs.len(), 1);
        assert!(draft.fee > 154_330);
        assert!(draft.bytes.starts_with(&[0x84]));
    }

    #[test]
    fn collateral_is_spent_only_when_needed() {
        let collateral = pure_utxo(0xc0, 0, 60_000_000);
        let wallet = vec![pure_utxo(0xa0, 0, 350_000_000), collateral.clone()];
        let draft = assemble_ticket_purchase(&inputs(wallet, collateral.clone())).unwrap();
        assert!(draft.wallet_inputs.contains(&collateral.out_ref));
    }

    #[test]
    fn shortfall_is_reported_as_draft_build_failure() {
        let collateral = pure_utxo(0xc0, 0, 6_000_000);
        let wallet = vec![pure_utxo(0xa0, 0, 10_000_000), collateral.clone()];
        let err = assemble_ticket_purchase(&inputs(wallet, collateral)).unwrap_err();
        assert!(matches!(err, Error::DraftBuild(_)));
        assert!(err.to_string().starts_with("draft build failed: "));
    }

    #[test]
    fn fee_is_stable_when_rebuilt() {
        let collateral = pure_utxo(0xc0, 0, 6_000_000);
        let wallet = vec![
            pure_utxo(0xa0, 0, 300_000_000),
            pure_utxo(0xa1, 1, 150_000_000),
            collateral.clone(),
        ];
        let first = assemble_ticket_purchase(&inputs(wallet.clone(), collateral.clone())).unwrap();
        let second = assemble_ticket_purchase(&inputs(wallet, collateral)).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.wallet_inputs.len(), 2);
    }
}
