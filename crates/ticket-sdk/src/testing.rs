//! Test utilities: an in-memory [`ChainIndexer`] and fixtures shaped like the
//! mainnet ticket sale.
//!
//! The mock records every call so tests can assert not only what the
//! pipeline produced but which lookups it made, and in what order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::chain::{ChainIndexer, IndexedOutput};
use crate::datum::encode_counter_datum;
use crate::error::IndexerError;
use crate::params::TicketProtocol;
use crate::protocol::ProtocolParameters;
use crate::script::{PlutusVersion, ScriptBytes, ScriptMetadata, ScriptReference};
use crate::utxo::{AssetAmount, OutputRef, Utxo};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Mainnet base address used as the buyer's change address.
pub const BUYER_ADDRESS: &str = "addr1q8lhsqwte7x5thy7pgs9d6dnf8lne5vm89vxm9s5s0nyfal92np3g2l2d0xqhj6fnt2pqt8wt5ew0g6g8mgcyy9xq3ps3uarlw";

/// The same address in the raw hex form CIP-30 wallets return.
pub const BUYER_ADDRESS_HEX: &str = "01ff7801cbcf8d45dc9e0a2056e9b349ff3cd19b39586d961483e644f7e554c3142bea6bcc0bcb499ad4102cee5d32e7a3483ed18210a60443";

/// Hash of the issuer validator, which doubles as the ticket policy.
pub const SCRIPT_HASH: &str = "ebbb5ecd5b5792ead7464b96d1a1a6551464906546ab08601be1a58a";
pub const SCRIPT_SIZE: usize = 4_096;

pub const SUBMITTED_TX_ID: &str =
    "9f2c1d0e8b7a6f5e4d3c2b1a09f8e7d6c5b4a39281706f5e4d3c2b1a0f9e8d7c";

/// A lovelace-only UTxO at [`BUYER_ADDRESS`] in transaction `[byte; 32]`.
pub fn pure_utxo(byte: u8, index: u32, lovelace: u64) -> Utxo {
    Utxo {
        out_ref: OutputRef::new(hex::encode([byte; 32]), index),
        address: BUYER_ADDRESS.to_string(),
        amount: vec![AssetAmount::lovelace(lovelace)],
        inline_datum: None,
        reference_script_hash: None,
    }
}

/// Like [`pure_utxo`] but also holding an unrelated native token.
pub fn token_utxo(byte: u8, index: u32, lovelace: u64) -> Utxo {
    let mut utxo = pure_utxo(byte, index, lovelace);
    utxo.amount.push(AssetAmount::new(
        "c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00464f4f",
        100,
    ));
    utxo
}

/// The beacon-tagged state UTxO at the issuer address holding `counter`.
pub fn state_utxo(protocol: &TicketProtocol, counter: i64) -> Utxo {
    let datum = encode_counter_datum(counter).expect("counter fits the datum encoding");
    Utxo {
        out_ref: OutputRef::new(hex::encode([0x5a; 32]), 0),
        address: protocol.issuer_address.clone(),
        amount: vec![
            AssetAmount::lovelace(2_000_000),
            AssetAmount::new(protocol.beacon_unit(), 1),
        ],
        inline_datum: Some(hex::encode(datum)),
        reference_script_hash: None,
    }
}

pub fn script_reference(protocol: &TicketProtocol) -> ScriptReference {
    ScriptReference {
        out_ref: protocol.script_reference.clone(),
        script_hash: SCRIPT_HASH.to_string(),
        version: PlutusVersion::V3,
        size: SCRIPT_SIZE,
    }
}

/// Mainnet-like parameters with a short PlutusV3 cost model.
pub fn protocol_parameters() -> ProtocolParameters {
    let mut cost_models = BTreeMap::new();
    cost_models.insert(
        PlutusVersion::V3,
        vec![100_788, 420, 1, 1, 1000, 173, 0, 1, 1000, 59_957, 4, 1, 11_183, 32, 201_305, 8356, 4],
    );
    ProtocolParameters {
        min_fee_a: 44,
        min_fee_b: 155_381,
        price_mem: 0.0577,
        price_step: 0.0000721,
        coins_per_utxo_byte: 4310,
        collateral_percent: 150,
        min_fee_ref_script_cost_per_byte: 15.0,
        cost_models,
    }
}

// ---------------------------------------------------------------------------
// Mock indexer
// ---------------------------------------------------------------------------

fn not_found(what: &str) -> IndexerError {
    IndexerError::HttpStatus {
        status: 404,
        message: format!("{what} not found"),
    }
}

/// In-memory indexer. Anything not configured answers 404.
#[derive(Debug, Default)]
pub struct MockIndexer {
    pub address_utxos: HashMap<String, Vec<Utxo>>,
    pub tx_outputs: HashMap<String, Vec<IndexedOutput>>,
    pub scripts: HashMap<String, (ScriptMetadata, ScriptBytes)>,
    pub params: Option<ProtocolParameters>,
    pub submit_result: Option<Result<String, IndexerError>>,
    calls: Mutex<Vec<String>>,
    submitted: Mutex<Vec<Vec<u8>>>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything a purchase needs: the state UTxO holding `counter`, the
    /// reference script (PlutusV3), protocol parameters and a submit answer.
    pub fn with_ticket_state(protocol: &TicketProtocol, counter: i64) -> Self {
        let mut mock = Self::new();
        mock.address_utxos.insert(
            protocol.issuer_address.clone(),
            vec![state_utxo(protocol, counter)],
        );
        mock.tx_outputs.insert(
            protocol.script_reference.tx_hash.clone(),
            vec![IndexedOutput {
                output_index: protocol.script_reference.index,
                address: protocol.issuer_address.clone(),
                amount: vec![AssetAmount::lovelace(20_000_000)],
                inline_datum: None,
                reference_script_hash: Some(SCRIPT_HASH.to_string()),
            }],
        );
        mock.set_script_type("plutusV3");
        mock.params = Some(protocol_parameters());
        mock.submit_result = Some(Ok(SUBMITTED_TX_ID.to_string()));
        mock
    }

    pub fn set_script_type(&mut self, script_type: &str) {
        self.scripts.insert(
            SCRIPT_HASH.to_string(),
            (
                ScriptMetadata {
                    script_type: script_type.to_string(),
                    serialised_size: Some(SCRIPT_SIZE as u64),
                },
                ScriptBytes {
                    cbor: vec![0x4e; SCRIPT_SIZE],
                },
            ),
        );
    }

    /// Calls made so far, e.g. `["address_utxos:addr1…", "protocol_parameters"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// True if any call so far starts with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl ChainIndexer for MockIndexer {
    async fn fetch_address_utxos(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> Result<Vec<Utxo>, IndexerError> {
        self.record(format!("address_utxos:{address}"));
        let utxos = self.address_utxos.get(address).cloned().unwrap_or_default();
        Ok(match asset {
            Some(unit) => utxos.into_iter().filter(|u| u.quantity_of(unit) > 0).collect(),
            None => utxos,
        })
    }

    async fn fetch_transaction_outputs(
        &self,
        tx_hash: &str,
    ) -> Result<Vec<IndexedOutput>, IndexerError> {
        self.record(format!("tx_outputs:{tx_hash}"));
        self.tx_outputs
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| not_found(tx_hash))
    }

    async fn fetch_script_metadata(
        &self,
        script_hash: &str,
    ) -> Result<ScriptMetadata, IndexerError> {
        self.record(format!("script:{script_hash}"));
        self.scripts
            .get(script_hash)
            .map(|(meta, _)| meta.clone())
            .ok_or_else(|| not_found(script_hash))
    }

    async fn fetch_script_bytes(&self, script_hash: &str) -> Result<ScriptBytes, IndexerError> {
        self.record(format!("script_cbor:{script_hash}"));
        self.scripts
            .get(script_hash)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| not_found(script_hash))
    }

    async fn fetch_protocol_parameters(&self) -> Result<ProtocolParameters, IndexerError> {
        self.record("protocol_parameters".to_string());
        self.params
            .clone()
            .ok_or_else(|| not_found("protocol parameters"))
    }

    async fn submit_transaction(&self, tx_cbor: &[u8]) -> Result<String, IndexerError> {
        self.record("submit".to_string());
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx_cbor.to_vec());
        self.submit_result
            .clone()
            .unwrap_or_else(|| Err(not_found("submit endpoint")))
    }
}
