use serde::{Deserialize, Serialize};

use crate::chain::ChainIndexer;
use crate::error::{Error, Result};
use crate::utxo::OutputRef;

/// Ledger script languages this client can spend and mint with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlutusVersion {
    V1,
    V2,
    V3,
}

impl PlutusVersion {
    /// Parse the indexer's script `type` (`plutusV1`, `plutusV2`, `plutusV3`).
    /// Native scripts and unknown languages are rejected rather than guessed.
    pub fn from_indexer_type(script_type: &str) -> Result<Self> {
        let normalized = script_type.trim().to_ascii_lowercase();
        let version = normalized.strip_prefix("plutus").unwrap_or(&normalized);
        match version {
            "v1" => Ok(PlutusVersion::V1),
            "v2" => Ok(PlutusVersion::V2),
            "v3" => Ok(PlutusVersion::V3),
            _ => Err(Error::UnsupportedScriptVersion(script_type.to_string())),
        }
    }

    /// Language id used in cost-model maps and language views.
    pub fn language_id(self) -> u8 {
        match self {
            PlutusVersion::V1 => 0,
            PlutusVersion::V2 => 1,
            PlutusVersion::V3 => 2,
        }
    }

    pub fn cost_model_key(self) -> &'static str {
        match self {
            PlutusVersion::V1 => "PlutusV1",
            PlutusVersion::V2 => "PlutusV2",
            PlutusVersion::V3 => "PlutusV3",
        }
    }
}

/// `GET scripts/{hash}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptMetadata {
    #[serde(rename = "type")]
    pub script_type: String,
    #[serde(default)]
    pub serialised_size: Option<u64>,
}

/// `GET scripts/{hash}/cbor`, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBytes {
    pub cbor: Vec<u8>,
}

impl ScriptBytes {
    pub fn len(&self) -> usize {
        self.cbor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cbor.is_empty()
    }
}

/// A script stored on-chain in some UTxO and referenced by the purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReference {
    pub out_ref: OutputRef,
    pub script_hash: String,
    pub version: PlutusVersion,
    pub size: usize,
}

/// Look up the reference script carried by `out_ref` and describe it.
pub async fn resolve_script_reference<I: ChainIndexer>(
    indexer: &I,
    out_ref: &OutputRef,
) -> Result<ScriptReference> {
    let outputs = indexer.fetch_transaction_outputs(&out_ref.tx_hash).await?;

    let output = outputs
        .iter()
        .find(|o| o.output_index == out_ref.index)
        .ok_or_else(|| Error::ScriptReferenceNotFound(format!("no output {out_ref}")))?;
    let script_hash = output.reference_script_hash.clone().ok_or_else(|| {
        Error::ScriptReferenceNotFound(format!("output {out_ref} carries no reference script"))
    })?;

    let metadata = indexer.fetch_script_metadata(&script_hash).await?;
    let version = PlutusVersion::from_indexer_type(&metadata.script_type)?;
    let bytes = indexer.fetch_script_bytes(&script_hash).await?;

    log::debug!(
        "reference script {script_hash} at {out_ref}: {version:?}, {} bytes",
        bytes.len()
    );

    Ok(ScriptReference {
        out_ref: out_ref.clone(),
        script_hash,
        version,
        size: bytes.len(),
    })
}
