use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, IndexerError, Result};
use crate::network::Network;
use crate::protocol::ProtocolParameters;
use crate::script::{PlutusVersion, ScriptBytes, ScriptMetadata};
use crate::utxo::{AssetAmount, OutputRef, Utxo};

/// Blockfrost returns at most this many entries per page.
const PAGE_SIZE: usize = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One output of a past transaction, as reported by `txs/{hash}/utxos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedOutput {
    pub output_index: u32,
    pub address: String,
    pub amount: Vec<AssetAmount>,
    pub inline_datum: Option<String>,
    pub reference_script_hash: Option<String>,
}

/// Backend for reading chain state and submitting transactions.
#[allow(async_fn_in_trait)]
pub trait ChainIndexer {
    /// UTxOs at `address`, optionally only those holding `asset` (policy ++ name hex).
    async fn fetch_address_utxos(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> std::result::Result<Vec<Utxo>, IndexerError>;

    /// Outputs of a confirmed transaction.
    async fn fetch_transaction_outputs(
        &self,
        tx_hash: &str,
    ) -> std::result::Result<Vec<IndexedOutput>, IndexerError>;

    async fn fetch_script_metadata(
        &self,
        script_hash: &str,
    ) -> std::result::Result<ScriptMetadata, IndexerError>;

    async fn fetch_script_bytes(
        &self,
        script_hash: &str,
    ) -> std::result::Result<ScriptBytes, IndexerError>;

    async fn fetch_protocol_parameters(
        &self,
    ) -> std::result::Result<ProtocolParameters, IndexerError>;

    /// Submit a signed transaction and return its id.
    async fn submit_transaction(&self, tx_cbor: &[u8])
    -> std::result::Result<String, IndexerError>;
}

/// Blockfrost-compatible HTTP indexer.
pub struct BlockfrostIndexer {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
}

impl BlockfrostIndexer {
    pub fn new(base_url: &str, project_id: &str) -> Result<Self> {
        Self::with_timeout(base_url, project_id, DEFAULT_TIMEOUT)
    }

    pub fn for_network(network: Network, project_id: &str) -> Result<Self> {
        Self::new(network.blockfrost_url(), project_id)
    }

    pub fn with_timeout(base_url: &str, project_id: &str, timeout: Duration) -> Result<Self> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(Error::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> std::result::Result<T, IndexerError> {
        let resp = self
            .client
            .get(self.url(path))
            .header("project_id", &self.project_id)
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(http_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| IndexerError::Parse(format!("{path}: {e}")))
    }
}

impl ChainIndexer for BlockfrostIndexer {
    async fn fetch_address_utxos(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> std::result::Result<Vec<Utxo>, IndexerError> {
        let base = match asset {
            Some(unit) => format!("addresses/{address}/utxos/{unit}"),
            None => format!("addresses/{address}/utxos"),
        };

        let mut utxos = Vec::new();
        let mut page = 1;
        loop {
            // 404 means the address has never held anything
            let entries: Vec<BfUtxo> = match self.get_json(&format!("{base}?page={page}")).await {
                Err(IndexerError::HttpStatus { status: 404, .. }) => break,
                other => other?,
            };
            let count = entries.len();
            for entry in entries {
                utxos.push(entry.into_utxo()?);
            }
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(utxos)
    }

    async fn fetch_transaction_outputs(
        &self,
        tx_hash: &str,
    ) -> std::result::Result<Vec<IndexedOutput>, IndexerError> {
        let tx: BfTxUtxos = self.get_json(&format!("txs/{tx_hash}/utxos")).await?;
        tx.outputs
            .into_iter()
            .map(BfTxOutput::into_output)
            .collect()
    }

    async fn fetch_script_metadata(
        &self,
        script_hash: &str,
    ) -> std::result::Result<ScriptMetadata, IndexerError> {
        self.get_json(&format!("scripts/{script_hash}")).await
    }

    async fn fetch_script_bytes(
        &self,
        script_hash: &str,
    ) -> std::result::Result<ScriptBytes, IndexerError> {
        let resp: BfScriptCbor = self.get_json(&format!("scripts/{script_hash}/cbor")).await?;
        let hex_cbor = resp
            .cbor
            .ok_or_else(|| IndexerError::Parse(format!("script {script_hash} has no cbor")))?;
        let cbor = hex::decode(&hex_cbor)
            .map_err(|e| IndexerError::Parse(format!("script {script_hash} cbor: {e}")))?;
        Ok(ScriptBytes { cbor })
    }

    async fn fetch_protocol_parameters(
        &self,
    ) -> std::result::Result<ProtocolParameters, IndexerError> {
        let params: BfProtocolParameters = self.get_json("epochs/latest/parameters").await?;
        params.into_parameters()
    }

    async fn submit_transaction(
        &self,
        tx_cbor: &[u8],
    ) -> std::result::Result<String, IndexerError> {
        let resp = self
            .client
            .post(self.url("tx/submit"))
            .header("project_id", &self.project_id)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(tx_cbor.to_vec())
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(http_error(status.as_u16(), &body));
        }
        parse_submitted_tx_id(&body)
    }
}

/// Turn an error response into a readable message. Blockfrost answers with
/// `{status_code, error, message}`; proxies and gateways often answer with
/// plain text or nothing at all.
fn http_error(status: u16, body: &str) -> IndexerError {
    let trimmed = body.trim();
    let message = match serde_json::from_str::<BfError>(trimmed) {
        Ok(BfError {
            error: Some(error),
            message: Some(message),
        }) => format!("{error}: {}", json_text(&message)),
        Ok(BfError {
            message: Some(message),
            ..
        }) => json_text(&message),
        Ok(BfError {
            error: Some(error), ..
        }) => error,
        _ if trimmed.is_empty() => reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("no response body")
            .to_string(),
        _ => trimmed.to_string(),
    };
    IndexerError::HttpStatus { status, message }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Submission answers with the tx id either as a JSON string or as bare text.
fn parse_submitted_tx_id(body: &str) -> std::result::Result<String, IndexerError> {
    let trimmed = body.trim();
    let tx_id = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed)
            .map_err(|e| IndexerError::Parse(format!("submit response: {e}")))?
    } else {
        trimmed.to_string()
    };
    if tx_id.len() != 64 || !tx_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(IndexerError::Parse(format!(
            "submit response is not a transaction id: {trimmed}"
        )));
    }
    Ok(tx_id)
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BfError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BfAmount {
    unit: String,
    quantity: String,
}

fn parse_amounts(amounts: Vec<BfAmount>) -> std::result::Result<Vec<AssetAmount>, IndexerError> {
    amounts
        .into_iter()
        .map(|a| {
            let quantity = a.quantity.parse::<u64>().map_err(|e| {
                IndexerError::Parse(format!("quantity {:?} of {}: {e}", a.quantity, a.unit))
            })?;
            Ok(AssetAmount::new(a.unit, quantity))
        })
        .collect()
}

#[derive(Deserialize)]
struct BfUtxo {
    address: String,
    tx_hash: String,
    output_index: u32,
    amount: Vec<BfAmount>,
    #[serde(default)]
    inline_datum: Option<String>,
    #[serde(default)]
    reference_script_hash: Option<String>,
}

impl BfUtxo {
    fn into_utxo(self) -> std::result::Result<Utxo, IndexerError> {
        Ok(Utxo {
            out_ref: OutputRef::new(self.tx_hash, self.output_index),
            address: self.address,
            amount: parse_amounts(self.amount)?,
            inline_datum: self.inline_datum,
            reference_script_hash: self.reference_script_hash,
        })
    }
}

#[derive(Deserialize)]
struct BfTxUtxos {
    outputs: Vec<BfTxOutput>,
}

#[derive(Deserialize)]
struct BfTxOutput {
    address: String,
    output_index: u32,
    amount: Vec<BfAmount>,
    #[serde(default)]
    inline_datum: Option<String>,
    #[serde(default)]
    reference_script_hash: Option<String>,
}

impl BfTxOutput {
    fn into_output(self) -> std::result::Result<IndexedOutput, IndexerError> {
        Ok(IndexedOutput {
            output_index: self.output_index,
            address: self.address,
            amount: parse_amounts(self.amount)?,
            inline_datum: self.inline_datum,
            reference_script_hash: self.reference_script_hash,
        })
    }
}

#[derive(Deserialize)]
struct BfScriptCbor {
    cbor: Option<String>,
}

#[derive(Deserialize)]
struct BfProtocolParameters {
    min_fee_a: u64,
    min_fee_b: u64,
    price_mem: Option<f64>,
    price_step: Option<f64>,
    coins_per_utxo_size: Option<String>,
    collateral_percent: Option<u64>,
    #[serde(default)]
    min_fee_ref_script_cost_per_byte: Option<f64>,
    #[serde(default)]
    cost_models_raw: Option<HashMap<String, Vec<i64>>>,
}

impl BfProtocolParameters {
    fn into_parameters(self) -> std::result::Result<ProtocolParameters, IndexerError> {
        let missing = |field: &str| IndexerError::Parse(format!("protocol parameters: missing {field}"));

        let coins_per_utxo_byte = self
            .coins_per_utxo_size
            .ok_or_else(|| missing("coins_per_utxo_size"))?
            .parse::<u64>()
            .map_err(|e| IndexerError::Parse(format!("coins_per_utxo_size: {e}")))?;

        let mut cost_models = BTreeMap::new();
        for (name, model) in self.cost_models_raw.unwrap_or_default() {
            let version = match name.as_str() {
                "PlutusV1" => PlutusVersion::V1,
                "PlutusV2" => PlutusVersion::V2,
                "PlutusV3" => PlutusVersion::V3,
                other => {
                    log::debug!("ignoring cost model for {other}");
                    continue;
                }
            };
            cost_models.insert(version, model);
        }

        Ok(ProtocolParameters {
            min_fee_a: self.min_fee_a,
            min_fee_b: self.min_fee_b,
            price_mem: self.price_mem.ok_or_else(|| missing("price_mem"))?,
            price_step: self.price_step.ok_or_else(|| missing("price_step"))?,
            coins_per_utxo_byte,
            collateral_percent: self
                .collateral_percent
                .ok_or_else(|| missing("collateral_percent"))?,
            min_fee_ref_script_cost_per_byte: self.min_fee_ref_script_cost_per_byte.unwrap_or(0.0),
            cost_models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected_before_any_request() {
        assert!(matches!(
            BlockfrostIndexer::new("http://localhost", "  "),
            Err(Error::MissingApiKey)
        ));
    }

    #[test]
    fn http_error_prefers_blockfrost_json_fields() {
        let err = http_error(
            404,
            r#"{"status_code":404,"error":"Not Found","message":"The requested component has not been found."}"#,
        );
        assert_eq!(
            err,
            IndexerError::HttpStatus {
                status: 404,
                message: "Not Found: The requested component has not been found.".into()
            }
        );
    }

    #[test]
    fn http_error_keeps_structured_submit_messages() {
        let err = http_error(
            400,
            r#"{"status_code":400,"error":"Bad Request","message":{"contents":"BadInputsUTxO"}}"#,
        );
        assert!(err.is_stale_input());
    }

    #[test]
    fn http_error_falls_back_to_text_or_reason() {
        assert_eq!(
            http_error(502, "upstream timed out"),
            IndexerError::HttpStatus {
                status: 502,
                message: "upstream timed out".into()
            }
        );
        assert_eq!(
            http_error(503, ""),
            IndexerError::HttpStatus {
                status: 503,
                message: "Service Unavailable".into()
            }
        );
    }

    #[test]
    fn submitted_tx_id_accepts_json_string_and_plain_text() {
        let id = "ab".repeat(32);
        assert_eq!(parse_submitted_tx_id(&format!("\"{id}\"")).unwrap(), id);
        assert_eq!(parse_submitted_tx_id(&format!("{id}\n")).unwrap(), id);
        assert!(parse_submitted_tx_id("{\"ok\":true}").is_err());
    }

    #[test]
    fn protocol_parameters_require_prices() {
        let raw: BfProtocolParameters = serde_json::from_str(
            r#"{"min_fee_a":44,"min_fee_b":155381,"price_mem":null,"price_step":0.0000721,
                "coins_per_utxo_size":"4310","collateral_percent":150}"#,
        )
        .unwrap();
        assert!(matches!(raw.into_parameters(), Err(IndexerError::Parse(_))));
    }
}
