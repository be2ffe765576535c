//! Conway-era transaction encoding.
//!
//! Covers the part of the ledger format needed to spend one script UTxO, mint
//! one token and pay key-hash addresses. Maps are written with ascending keys
//! and definite lengths, so encoding the same body twice yields the same
//! bytes. Sets (inputs, collateral, reference inputs) are plain arrays.

pub mod fee;

use std::collections::BTreeSet;
use std::convert::Infallible;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use minicbor::Encoder;
use minicbor::data::Tag;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::params::ExUnits;
use crate::script::PlutusVersion;
use crate::utxo::OutputRef;
use crate::value::{MultiAsset, Value};

type Blake2b256 = Blake2b<U32>;
pub(crate) type EncodeError = minicbor::encode::Error<Infallible>;
pub(crate) type Enc = Encoder<Vec<u8>>;

/// `#6.24(bytes)`: embedded CBOR, used for inline datums.
const ENCODED_CBOR: u64 = 24;
const DATUM_OPTION_INLINE: u8 = 1;

/// `Constr 0 []`, the unit redeemer.
pub const UNIT_REDEEMER: [u8; 3] = [0xd8, 0x79, 0x80];

pub fn blake2b256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Run `f` against a fresh encoder and hand back the bytes.
pub(crate) fn encoded<F>(f: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut Enc) -> std::result::Result<(), EncodeError>,
{
    let mut e = Encoder::new(Vec::new());
    f(&mut e).map_err(|err| Error::DraftBuild(err.to_string()))?;
    Ok(e.into_writer())
}

/// Append already-encoded CBOR as one item.
pub(crate) fn raw(e: &mut Enc, item: &[u8]) {
    e.writer_mut().extend_from_slice(item);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxIn {
    pub tx_hash: [u8; 32],
    pub index: u32,
}

impl TxIn {
    pub fn from_out_ref(out_ref: &OutputRef) -> Result<Self> {
        Ok(Self {
            tx_hash: out_ref.tx_hash_bytes()?,
            index: out_ref.index,
        })
    }
}

fn encode_inputs(e: &mut Enc, inputs: &BTreeSet<TxIn>) -> std::result::Result<(), EncodeError> {
    e.array(inputs.len() as u64)?;
    for input in inputs {
        e.array(2)?.bytes(&input.tx_hash)?.u32(input.index)?;
    }
    Ok(())
}

fn encode_multiasset(e: &mut Enc, assets: &MultiAsset) -> std::result::Result<(), EncodeError> {
    e.map(assets.len() as u64)?;
    for (policy, names) in assets {
        e.bytes(policy)?.map(names.len() as u64)?;
        for (name, quantity) in names {
            e.bytes(&name.0)?.u64(*quantity)?;
        }
    }
    Ok(())
}

fn encode_value(e: &mut Enc, value: &Value) -> std::result::Result<(), EncodeError> {
    if value.is_lovelace_only() {
        e.u64(value.coin)?;
    } else {
        e.array(2)?.u64(value.coin)?;
        encode_multiasset(e, &value.assets)?;
    }
    Ok(())
}

/// Post-Alonzo output: `{0: address, 1: value, ? 2: [1, #6.24(datum)]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub address: Vec<u8>,
    pub value: Value,
    /// Inline datum, already CBOR-encoded.
    pub inline_datum: Option<Vec<u8>>,
}

impl TxOut {
    pub fn new(address: &Address, value: Value) -> Self {
        Self {
            address: address.as_bytes().to_vec(),
            value,
            inline_datum: None,
        }
    }

    pub fn with_inline_datum(mut self, datum: Vec<u8>) -> Self {
        self.inline_datum = Some(datum);
        self
    }

    fn encode_into(&self, e: &mut Enc) -> std::result::Result<(), EncodeError> {
        e.map(if self.inline_datum.is_some() { 3 } else { 2 })?;
        e.u8(0)?.bytes(&self.address)?;
        e.u8(1)?;
        encode_value(e, &self.value)?;
        if let Some(datum) = &self.inline_datum {
            e.u8(2)?.array(2)?.u8(DATUM_OPTION_INLINE)?;
            e.tag(Tag::new(ENCODED_CBOR))?.bytes(datum)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encoded(|e| self.encode_into(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemerTag {
    Spend = 0,
    Mint = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    /// Position of the spent input (sorted order) or minted policy.
    pub index: u32,
    pub data: Vec<u8>,
    pub ex_units: ExUnits,
}

impl Redeemer {
    pub fn unit(tag: RedeemerTag, index: u32, ex_units: ExUnits) -> Self {
        Self {
            tag,
            index,
            data: UNIT_REDEEMER.to_vec(),
            ex_units,
        }
    }
}

fn encode_redeemers_into(e: &mut Enc, redeemers: &[Redeemer]) -> std::result::Result<(), EncodeError> {
    e.array(redeemers.len() as u64)?;
    for r in redeemers {
        e.array(4)?.u8(r.tag as u8)?.u32(r.index)?;
        raw(e, &r.data);
        e.array(2)?.u64(r.ex_units.mem)?.u64(r.ex_units.steps)?;
    }
    Ok(())
}

/// Redeemers in the legacy array form, exactly as they appear in the
/// witness set and in the script data hash preimage.
pub fn encode_redeemers(redeemers: &[Redeemer]) -> Result<Vec<u8>> {
    encoded(|e| encode_redeemers_into(e, redeemers))
}

/// The cost-model map covered by the script data hash, for one language.
pub fn language_views(version: PlutusVersion, costs: &[i64]) -> Result<Vec<u8>> {
    encoded(|e| {
        e.map(1)?;
        match version {
            PlutusVersion::V1 => {
                // V1 wraps both key and value in byte strings, the value
                // holding an indefinite-length list.
                let mut inner = Encoder::new(Vec::new());
                inner.begin_array()?;
                for cost in costs {
                    inner.i64(*cost)?;
                }
                inner.end()?;
                e.bytes(&[version.language_id()])?;
                e.bytes(&inner.into_writer())?;
            }
            PlutusVersion::V2 | PlutusVersion::V3 => {
                e.u8(version.language_id())?.array(costs.len() as u64)?;
                for cost in costs {
                    e.i64(*cost)?;
                }
            }
        }
        Ok(())
    })
}

/// `blake2b-256(redeemers ‖ language views)`; the transaction carries no
/// datum witnesses, so that part of the preimage is empty.
pub fn script_data_hash(redeemers: &[u8], language_views: &[u8]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(redeemers.len() + language_views.len());
    preimage.extend_from_slice(redeemers);
    preimage.extend_from_slice(language_views);
    blake2b256(&preimage)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxBody {
    pub inputs: BTreeSet<TxIn>,
    pub outputs: Vec<TxOut>,
    pub fee: u64,
    pub ttl: u64,
    pub mint: MultiAsset,
    pub script_data_hash: Option<[u8; 32]>,
    pub collateral: BTreeSet<TxIn>,
    pub collateral_return: Option<TxOut>,
    pub total_collateral: Option<u64>,
    pub reference_inputs: BTreeSet<TxIn>,
}

impl TxBody {
    /// Index of `input` among the body's inputs as the ledger orders them.
    pub fn input_index(&self, input: &TxIn) -> Option<u32> {
        self.inputs
            .iter()
            .position(|i| i == input)
            .map(|p| p as u32)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encoded(|e| {
            let fields = 4
                + u64::from(!self.mint.is_empty())
                + u64::from(self.script_data_hash.is_some())
                + u64::from(!self.collateral.is_empty())
                + u64::from(self.collateral_return.is_some())
                + u64::from(self.total_collateral.is_some())
                + u64::from(!self.reference_inputs.is_empty());
            e.map(fields)?;

            e.u8(0)?;
            encode_inputs(e, &self.inputs)?;
            e.u8(1)?.array(self.outputs.len() as u64)?;
            for output in &self.outputs {
                output.encode_into(e)?;
            }
            e.u8(2)?.u64(self.fee)?;
            e.u8(3)?.u64(self.ttl)?;
            if !self.mint.is_empty() {
                e.u8(9)?;
                encode_multiasset(e, &self.mint)?;
            }
            if let Some(hash) = &self.script_data_hash {
                e.u8(11)?.bytes(hash)?;
            }
            if !self.collateral.is_empty() {
                e.u8(13)?;
                encode_inputs(e, &self.collateral)?;
            }
            if let Some(ret) = &self.collateral_return {
                e.u8(16)?;
                ret.encode_into(e)?;
            }
            if let Some(total) = self.total_collateral {
                e.u8(17)?.u64(total)?;
            }
            if !self.reference_inputs.is_empty() {
                e.u8(18)?;
                encode_inputs(e, &self.reference_inputs)?;
            }
            Ok(())
        })
    }
}

pub type VkeyWitness = ([u8; 32], [u8; 64]);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessSet {
    pub vkeys: Vec<VkeyWitness>,
    pub redeemers: Vec<Redeemer>,
}

impl WitnessSet {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encoded(|e| {
            let fields = u64::from(!self.vkeys.is_empty()) + u64::from(!self.redeemers.is_empty());
            e.map(fields)?;
            if !self.vkeys.is_empty() {
                e.u8(0)?.array(self.vkeys.len() as u64)?;
                for (vkey, signature) in &self.vkeys {
                    e.array(2)?.bytes(vkey)?.bytes(signature)?;
                }
            }
            if !self.redeemers.is_empty() {
                e.u8(5)?;
                encode_redeemers_into(e, &self.redeemers)?;
            }
            Ok(())
        })
    }
}

/// `[body, witness_set, is_valid, auxiliary_data / null]` from parts that
/// are already encoded. The body is spliced in byte for byte so its hash,
/// and therefore every signature over it, is preserved.
pub fn encode_transaction(
    body: &[u8],
    witness_set: &[u8],
    is_valid: bool,
    auxiliary_data: Option<&[u8]>,
) -> Result<Vec<u8>> {
    encoded(|e| {
        e.array(4)?;
        raw(e, body);
        raw(e, witness_set);
        e.bool(is_valid)?;
        match auxiliary_data {
            Some(aux) => raw(e, aux),
            None => {
                e.null()?;
            }
        }
        Ok(())
    })
}

pub fn transaction_id(body: &[u8]) -> [u8; 32] {
    blake2b256(body)
}
