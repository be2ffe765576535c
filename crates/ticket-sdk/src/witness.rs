//! Combining wallet signatures with the draft transaction.
//!
//! Wallets answer a signing request in one of two shapes: a complete
//! transaction, or just the witness set they produced. The first is
//! forwarded untouched. The second is merged into the draft, keeping the
//! draft's body bytes verbatim so the transaction id the wallet signed does
//! not change.

use std::collections::BTreeMap;

use minicbor::Decoder;
use minicbor::data::{Tag, Type};

use crate::error::{Error, Result};
use crate::tx::{encode_transaction, encoded, raw};

/// Witness set key holding `[vkey, signature]` pairs.
const VKEY_WITNESSES: u64 = 0;
/// Conway's optional set tag.
const SET_TAG: u64 = 258;
const BREAK: u8 = 0xff;

/// Strip surrounding whitespace and an optional `0x` / `0X` prefix.
pub fn normalize_hex(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

fn decode_hex(what: &str, input: &str) -> Result<Vec<u8>> {
    hex::decode(normalize_hex(input)).map_err(|e| Error::InvalidHex(format!("{what}: {e}")))
}

fn decode_err(e: minicbor::decode::Error) -> Error {
    Error::Decode(e.to_string())
}

/// What the wallet handed back from a signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletResponse {
    Transaction(Vec<u8>),
    WitnessSet(Vec<u8>),
}

impl WalletResponse {
    /// Try the full-transaction shape first, then a bare witness set.
    pub fn classify(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::EmptyWitness);
        }
        if parse_transaction(&bytes).is_some() {
            return Ok(WalletResponse::Transaction(bytes));
        }
        if is_single_map(&bytes) {
            return Ok(WalletResponse::WitnessSet(bytes));
        }
        Err(Error::Decode(
            "wallet payload is neither a transaction nor a witness set".into(),
        ))
    }
}

/// A transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedTransaction {
    /// The wallet returned a complete transaction; forwarded as-is.
    Complete { bytes: Vec<u8> },
    /// Draft body plus the combined vkey witnesses.
    Merged { bytes: Vec<u8>, signatures: usize },
}

impl SignedTransaction {
    pub fn bytes(&self) -> &[u8] {
        match self {
            SignedTransaction::Complete { bytes } | SignedTransaction::Merged { bytes, .. } => {
                bytes
            }
        }
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bytes())
    }

    /// Signature count, known only when the merge was done here.
    pub fn signatures(&self) -> Option<usize> {
        match self {
            SignedTransaction::Complete { .. } => None,
            SignedTransaction::Merged { signatures, .. } => Some(*signatures),
        }
    }
}

/// Byte spans of a decoded transaction envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Envelope<'b> {
    body: &'b [u8],
    witness_set: &'b [u8],
    is_valid: bool,
    auxiliary_data: Option<&'b [u8]>,
}

fn item_span<'b>(d: &mut Decoder<'b>) -> std::result::Result<&'b [u8], minicbor::decode::Error> {
    let start = d.position();
    d.skip()?;
    Ok(&d.input()[start..d.position()])
}

fn is_map(d: &Decoder<'_>) -> bool {
    matches!(d.datatype(), Ok(Type::Map | Type::MapIndef))
}

fn is_single_map(bytes: &[u8]) -> bool {
    let mut d = Decoder::new(bytes);
    is_map(&d) && d.skip().is_ok() && d.position() == bytes.len()
}

/// `[body, witnesses, is_valid, aux]`, or the older `[body, witnesses, aux]`,
/// consuming every byte.
fn parse_transaction(bytes: &[u8]) -> Option<Envelope<'_>> {
    let mut d = Decoder::new(bytes);
    let len = d.array().ok()??;
    if len != 3 && len != 4 {
        return None;
    }
    if !is_map(&d) {
        return None;
    }
    let body = item_span(&mut d).ok()?;
    if !is_map(&d) {
        return None;
    }
    let witness_set = item_span(&mut d).ok()?;
    let is_valid = if len == 4 { d.bool().ok()? } else { true };
    let auxiliary_data = match d.datatype().ok()? {
        Type::Null => {
            d.skip().ok()?;
            None
        }
        _ => Some(item_span(&mut d).ok()?),
    };
    if d.position() != bytes.len() {
        return None;
    }
    Some(Envelope {
        body,
        witness_set,
        is_valid,
        auxiliary_data,
    })
}

/// A bare body: valid, no witnesses, no auxiliary data.
fn parse_body_only(bytes: &[u8]) -> Option<Envelope<'_>> {
    is_single_map(bytes).then_some(Envelope {
        body: bytes,
        witness_set: &[],
        is_valid: true,
        auxiliary_data: None,
    })
}

#[derive(Debug, Default)]
struct WitnessFields<'b> {
    vkeys: Vec<&'b [u8]>,
    tagged_vkeys: bool,
    others: BTreeMap<u64, &'b [u8]>,
}

/// Walk a definite or indefinite container, calling `item` once per entry.
fn for_each_entry<'b, F>(d: &mut Decoder<'b>, len: Option<u64>, mut item: F) -> Result<()>
where
    F: FnMut(&mut Decoder<'b>) -> Result<()>,
{
    match len {
        Some(n) => {
            for _ in 0..n {
                item(d)?;
            }
        }
        None => loop {
            if d.datatype().map_err(decode_err)? == Type::Break {
                if d.input().get(d.position()) == Some(&BREAK) {
                    d.set_position(d.position() + 1);
                }
                break;
            }
            item(d)?;
        },
    }
    Ok(())
}

fn witness_fields(bytes: &[u8]) -> Result<WitnessFields<'_>> {
    let mut fields = WitnessFields::default();
    if bytes.is_empty() {
        return Ok(fields);
    }

    let mut d = Decoder::new(bytes);
    let entries = d.map().map_err(decode_err)?;
    for_each_entry(&mut d, entries, |d| {
        let key = d.u64().map_err(decode_err)?;
        if key == VKEY_WITNESSES {
            if d.datatype().map_err(decode_err)? == Type::Tag {
                let tag = d.tag().map_err(decode_err)?;
                if tag != Tag::new(SET_TAG) {
                    return Err(Error::Decode(format!("unexpected tag {tag:?} on vkey witnesses")));
                }
                fields.tagged_vkeys = true;
            }
            let len = d.array().map_err(decode_err)?;
            for_each_entry(d, len, |d| {
                fields.vkeys.push(item_span(d).map_err(decode_err)?);
                Ok(())
            })
        } else {
            fields.others.insert(key, item_span(d).map_err(decode_err)?);
            Ok(())
        }
    })?;
    Ok(fields)
}

/// Count the vkey witnesses in an encoded witness set.
pub fn count_vkey_witnesses(witness_set: &[u8]) -> Result<usize> {
    Ok(witness_fields(witness_set)?.vkeys.len())
}

fn merge_witness_sets(draft: WitnessFields<'_>, wallet: WitnessFields<'_>) -> Result<(Vec<u8>, usize)> {
    let mut vkeys = draft.vkeys;
    vkeys.extend(wallet.vkeys);
    let tagged = draft.tagged_vkeys || wallet.tagged_vkeys;

    // Draft fields (redeemers) win; the wallet may only add what is absent.
    let mut others = draft.others;
    for (key, value) in wallet.others {
        others.entry(key).or_insert(value);
    }

    let count = vkeys.len();
    let bytes = encoded(|e| {
        e.map(u64::from(!vkeys.is_empty()) + others.len() as u64)?;
        if !vkeys.is_empty() {
            e.u64(VKEY_WITNESSES)?;
            if tagged {
                e.tag(Tag::new(SET_TAG))?;
            }
            e.array(vkeys.len() as u64)?;
            for vkey in &vkeys {
                raw(e, vkey);
            }
        }
        for (key, value) in &others {
            e.u64(*key)?;
            raw(e, value);
        }
        Ok(())
    })?;
    Ok((bytes, count))
}

/// Merge the wallet's signing response into the unsigned draft.
pub fn merge_wallet_witnesses(draft_hex: &str, wallet_hex: &str) -> Result<SignedTransaction> {
    if normalize_hex(wallet_hex).is_empty() {
        return Err(Error::EmptyWitness);
    }
    let wallet = decode_hex("wallet witness", wallet_hex)?;

    let wallet_witnesses = match WalletResponse::classify(wallet)? {
        WalletResponse::Transaction(bytes) => {
            log::info!("wallet returned a complete transaction; passing it through");
            return Ok(SignedTransaction::Complete { bytes });
        }
        WalletResponse::WitnessSet(bytes) => bytes,
    };

    let draft = decode_hex("draft", draft_hex)?;
    let envelope = parse_transaction(&draft)
        .or_else(|| parse_body_only(&draft))
        .ok_or_else(|| Error::Decode("draft is neither a transaction nor a body".into()))?;

    let (witness_set, signatures) = merge_witness_sets(
        witness_fields(envelope.witness_set)?,
        witness_fields(&wallet_witnesses)?,
    )?;
    if signatures == 0 {
        return Err(Error::NoSignatures);
    }

    let bytes = encode_transaction(
        envelope.body,
        &witness_set,
        envelope.is_valid,
        envelope.auxiliary_data,
    )?;
    log::info!("merged wallet witnesses: {signatures} signature(s)");
    Ok(SignedTransaction::Merged { bytes, signatures })
}
