use thiserror::Error;

use crate::datum::DatumError;

/// Failures talking to the chain indexer, normalized at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexerError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("indexer transport error: {0}")]
    Transport(String),

    /// The indexer answered with a non-success status.
    #[error("indexer returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The response body was not the JSON we expected.
    #[error("unexpected indexer response: {0}")]
    Parse(String),
}

impl IndexerError {
    pub fn message(&self) -> &str {
        match self {
            IndexerError::Transport(m) | IndexerError::Parse(m) => m,
            IndexerError::HttpStatus { message, .. } => message,
        }
    }

    /// The ledger rejected an input that is no longer unspent, which for this
    /// protocol means another buyer consumed the state UTxO first.
    pub fn is_stale_input(&self) -> bool {
        match self {
            IndexerError::HttpStatus { message, .. } => {
                message.contains("BadInputsUTxO") || message.contains("ValueNotConservedUTxO")
            }
            _ => false,
        }
    }
}

/// Coarse classification used when presenting a failure to the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wallet or configuration missing.
    Environment,
    /// Something on-chain (balance, collateral, state UTxO) is not as needed.
    Resource,
    /// The indexer or the scripts it describes misbehaved.
    ExternalService,
    /// Hex, CBOR or witness data could not be understood.
    Format,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing indexer API key")]
    MissingApiKey,

    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("insufficient balance: need {required} lovelace, wallet holds {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("no lovelace-only UTxO available for collateral")]
    NoPureLovelaceUtxo,

    #[error(
        "no lovelace-only UTxO above the {minimum} lovelace collateral minimum (largest is {largest})"
    )]
    CollateralBelowMinimum { minimum: u64, largest: u64 },

    #[error("ticket state UTxO not found at {0}")]
    StateUtxoNotFound(String),

    #[error("ticket counter unreadable: {0}")]
    CounterUnreadable(DatumError),

    #[error("insufficient inputs: {0}")]
    InsufficientInputs(String),

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error("unsupported script version: {0}")]
    UnsupportedScriptVersion(String),

    #[error("reference script not found: {0}")]
    ScriptReferenceNotFound(String),

    #[error("protocol parameters incomplete: {0}")]
    ProtocolParameters(String),

    #[error("not valid hex: {0}")]
    InvalidHex(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid asset unit: {0}")]
    InvalidAsset(String),

    #[error("undecodable transaction: {0}")]
    Decode(String),

    #[error("wallet returned an empty witness payload")]
    EmptyWitness,

    #[error("no signatures present after merging wallet witnesses")]
    NoSignatures,

    #[error("draft build failed: {0}")]
    DraftBuild(String),

    #[error("value overflow")]
    ValueOverflow,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingApiKey | Error::WalletUnavailable(_) => ErrorKind::Environment,
            Error::InsufficientBalance { .. }
            | Error::NoPureLovelaceUtxo
            | Error::CollateralBelowMinimum { .. }
            | Error::StateUtxoNotFound(_)
            | Error::CounterUnreadable(_)
            | Error::InsufficientInputs(_) => ErrorKind::Resource,
            Error::Indexer(e) if e.is_stale_input() => ErrorKind::Resource,
            Error::Indexer(_)
            | Error::UnsupportedScriptVersion(_)
            | Error::ScriptReferenceNotFound(_)
            | Error::ProtocolParameters(_) => ErrorKind::ExternalService,
            Error::InvalidHex(_)
            | Error::InvalidAddress(_)
            | Error::InvalidAsset(_)
            | Error::Decode(_)
            | Error::EmptyWitness
            | Error::NoSignatures
            | Error::ValueOverflow => ErrorKind::Format,
            Error::DraftBuild(_) => ErrorKind::Format,
        }
    }

    /// Whether re-triggering the purchase may succeed without the buyer
    /// changing anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Indexer(IndexerError::Transport(_)) => true,
            Error::Indexer(IndexerError::HttpStatus { status, .. }) if *status >= 500 => true,
            Error::Indexer(e) => e.is_stale_input(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
