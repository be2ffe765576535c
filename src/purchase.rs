//! One ticket purchase attempt, from reading the wallet to submission.
//!
//! Every failure, whatever its source, comes back as a [`PurchaseFailure`]
//! so the caller renders a single shape. Nothing here retries: a new
//! attempt re-reads the counter from scratch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use ticket_sdk::{ChainIndexer, Error, ErrorKind, IndexerError, TicketSdk, WalletSnapshot};

use crate::wallet::WalletApi;

/// Where in the attempt a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasePhase {
    ReadWallet,
    BuildDraft,
    Sign,
    Merge,
    Submit,
}

impl PurchasePhase {
    pub fn prefix(self) -> &'static str {
        match self {
            PurchasePhase::ReadWallet => "Could not read wallet",
            PurchasePhase::BuildDraft => "Could not build transaction",
            PurchasePhase::Sign => "Signing failed",
            PurchasePhase::Merge => "Could not combine signatures",
            PurchasePhase::Submit => "Submission failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub tx_id: String,
    pub ticket_name: String,
    /// Counter value consumed by this purchase.
    pub counter: i64,
    pub price: u64,
    pub fee: u64,
    pub signatures: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{}: {}", .phase.prefix(), .message)]
pub struct PurchaseFailure {
    pub phase: PurchasePhase,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub context: BTreeMap<String, String>,
}

impl PurchaseFailure {
    pub fn new(phase: PurchasePhase, err: &Error) -> Self {
        let mut context = BTreeMap::new();
        let mut message = err.to_string();

        match err {
            Error::InsufficientBalance {
                required,
                available,
            } => {
                context.insert("required".into(), required.to_string());
                context.insert("available".into(), available.to_string());
            }
            Error::CollateralBelowMinimum { minimum, largest } => {
                context.insert("minimum".into(), minimum.to_string());
                context.insert("largest".into(), largest.to_string());
            }
            Error::Indexer(inner) => {
                if let IndexerError::HttpStatus { status, .. } = inner {
                    context.insert("status".into(), status.to_string());
                }
                if inner.is_stale_input() {
                    context.insert("ledger".into(), inner.message().to_string());
                    message = "the ticket state was spent by another purchase; build again".into();
                }
            }
            _ => {}
        }

        Self {
            phase,
            kind: err.kind(),
            message,
            retryable: err.is_retryable(),
            context,
        }
    }

    pub fn with_context(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }

    /// `"<phase prefix>: <message>"`, ready for the status line.
    pub fn status_message(&self) -> String {
        self.to_string()
    }
}

fn failed(failure: PurchaseFailure) -> PurchaseFailure {
    log::warn!(
        "purchase failed ({:?}, {:?}, retryable={}): {}",
        failure.phase,
        failure.kind,
        failure.retryable,
        failure.message
    );
    failure
}

/// Run one purchase attempt end to end.
pub async fn purchase_ticket<I, W>(
    sdk: &TicketSdk<I>,
    wallet: &W,
    now: DateTime<Utc>,
) -> Result<PurchaseReceipt, PurchaseFailure>
where
    I: ChainIndexer,
    W: WalletApi,
{
    let snapshot = read_wallet(wallet).await?;

    let prepared = sdk
        .prepare_purchase(&snapshot, now)
        .await
        .map_err(|e| failed(PurchaseFailure::new(PurchasePhase::BuildDraft, &e)))?;
    let draft = prepared.draft;
    log::info!(
        "draft {} mints {} (counter {} -> {}), fee {}",
        draft.tx_id,
        draft.ticket_name,
        draft.current_counter,
        draft.next_counter,
        draft.fee
    );
    let draft_hex = draft.hex();

    let witness = wallet.sign_tx(&draft_hex, true).await.map_err(|e| {
        failed(PurchaseFailure::new(PurchasePhase::Sign, &e).with_context("txId", &draft.tx_id))
    })?;

    let signed = sdk.finalize(&draft_hex, &witness).map_err(|e| {
        failed(PurchaseFailure::new(PurchasePhase::Merge, &e).with_context("txId", &draft.tx_id))
    })?;

    let tx_id = sdk.submit(&signed).await.map_err(|e| {
        failed(
            PurchaseFailure::new(PurchasePhase::Submit, &e)
                .with_context("txId", &draft.tx_id)
                .with_context("ticket", &draft.ticket_name),
        )
    })?;

    Ok(PurchaseReceipt {
        tx_id,
        ticket_name: draft.ticket_name,
        counter: draft.current_counter,
        price: draft.price,
        fee: draft.fee,
        signatures: signed.signatures(),
    })
}

async fn read_wallet<W: WalletApi>(wallet: &W) -> Result<WalletSnapshot, PurchaseFailure> {
    let phase = |e: Error| failed(PurchaseFailure::new(PurchasePhase::ReadWallet, &e));

    let utxos = wallet.list_utxos().await.map_err(phase)?;
    let change_address = wallet.change_address().await.map_err(phase)?;
    let collateral = match wallet.collateral().await {
        Ok(collateral) => collateral,
        Err(e) => {
            log::warn!("wallet collateral unavailable, choosing from UTxOs: {e}");
            Vec::new()
        }
    };

    Ok(WalletSnapshot {
        utxos,
        change_address,
        collateral,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use ticket_sdk::testing::{BUYER_ADDRESS, MockIndexer, SUBMITTED_TX_ID, pure_utxo};
    use ticket_sdk::{Network, TicketProtocol, Utxo};

    // ── Helpers ──────────────────────────────────────────────────────────

    struct FakeWallet {
        utxos: Vec<Utxo>,
        witness: std::result::Result<String, String>,
        signed: Mutex<Vec<String>>,
    }

    impl FakeWallet {
        fn signing_with(utxos: Vec<Utxo>, witness: &str) -> Self {
            Self {
                utxos,
                witness: Ok(witness.to_string()),
                signed: Mutex::new(Vec::new()),
            }
        }
    }

    impl WalletApi for FakeWallet {
        async fn list_utxos(&self) -> ticket_sdk::Result<Vec<Utxo>> {
            Ok(self.utxos.clone())
        }

        async fn change_address(&self) -> ticket_sdk::Result<String> {
            Ok(BUYER_ADDRESS.to_string())
        }

        async fn collateral(&self) -> ticket_sdk::Result<Vec<Utxo>> {
            Err(Error::WalletUnavailable("getCollateral not supported".into()))
        }

        async fn sign_tx(&self, draft_hex: &str, partial: bool) -> ticket_sdk::Result<String> {
            assert!(partial);
            self.signed.lock().unwrap().push(draft_hex.to_string());
            self.witness.clone().map_err(Error::WalletUnavailable)
        }

        async fn submit_tx(&self, _signed_hex: &str) -> ticket_sdk::Result<String> {
            unreachable!("purchases submit through the indexer")
        }
    }

    fn one_signature() -> String {
        format!(
            "a10081825820{}5840{}",
            hex::encode([7u8; 32]),
            hex::encode([7u8; 64])
        )
    }

    fn funded() -> Vec<Utxo> {
        vec![pure_utxo(0xa0, 0, 444_000_000), pure_utxo(0xa1, 0, 6_000_000)]
    }

    fn sdk_with(mock: MockIndexer) -> TicketSdk<MockIndexer> {
        TicketSdk::new(mock, TicketProtocol::mainnet(), Network::Mainnet)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn successful_purchase_returns_receipt() {
        let protocol = TicketProtocol::mainnet();
        let sdk = sdk_with(MockIndexer::with_ticket_state(&protocol, 41));
        let wallet = FakeWallet::signing_with(funded(), &one_signature());

        let receipt = purchase_ticket(&sdk, &wallet, now()).await.unwrap();
        assert_eq!(receipt.tx_id, SUBMITTED_TX_ID);
        assert_eq!(receipt.ticket_name, "TICKET41");
        assert_eq!(receipt.counter, 41);
        assert_eq!(receipt.price, 400_000_000);
        assert_eq!(receipt.signatures, Some(1));
        assert_eq!(wallet.signed.lock().unwrap().len(), 1);
        assert_eq!(sdk.indexer().submitted().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_balance_is_a_resource_failure() {
        let protocol = TicketProtocol::mainnet();
        let sdk = sdk_with(MockIndexer::with_ticket_state(&protocol, 41));
        let wallet = FakeWallet::signing_with(vec![pure_utxo(1, 0, 50_000_000)], &one_signature());

        let failure = purchase_ticket(&sdk, &wallet, now()).await.unwrap_err();
        assert_eq!(failure.phase, PurchasePhase::BuildDraft);
        assert_eq!(failure.kind, ErrorKind::Resource);
        assert!(!failure.retryable);
        assert_eq!(failure.context["required"], "405000000");
        assert_eq!(failure.context["available"], "50000000");
        assert!(
            failure
                .status_message()
                .starts_with("Could not build transaction: insufficient balance")
        );
        assert!(wallet.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn declined_signature_reports_sign_phase() {
        let protocol = TicketProtocol::mainnet();
        let sdk = sdk_with(MockIndexer::with_ticket_state(&protocol, 41));
        let mut wallet = FakeWallet::signing_with(funded(), "");
        wallet.witness = Err("user declined".into());

        let failure = purchase_ticket(&sdk, &wallet, now()).await.unwrap_err();
        assert_eq!(failure.phase, PurchasePhase::Sign);
        assert_eq!(failure.kind, ErrorKind::Environment);
        assert!(failure.context.contains_key("txId"));
        assert!(sdk.indexer().submitted().is_empty());
    }

    #[tokio::test]
    async fn empty_witness_reports_merge_phase() {
        let protocol = TicketProtocol::mainnet();
        let sdk = sdk_with(MockIndexer::with_ticket_state(&protocol, 41));
        let wallet = FakeWallet::signing_with(funded(), "  ");

        let failure = purchase_ticket(&sdk, &wallet, now()).await.unwrap_err();
        assert_eq!(failure.phase, PurchasePhase::Merge);
        assert_eq!(failure.kind, ErrorKind::Format);
        assert_eq!(
            failure.status_message(),
            "Could not combine signatures: wallet returned an empty witness payload"
        );
    }

    #[tokio::test]
    async fn lost_counter_race_is_retryable() {
        let protocol = TicketProtocol::mainnet();
        let mut mock = MockIndexer::with_ticket_state(&protocol, 41);
        mock.submit_result = Some(Err(IndexerError::HttpStatus {
            status: 400,
            message: "ApplyTxError (ConwayUtxowFailure (UtxoFailure (BadInputsUTxO ...)))".into(),
        }));
        let sdk = sdk_with(mock);
        let wallet = FakeWallet::signing_with(funded(), &one_signature());

        let failure = purchase_ticket(&sdk, &wallet, now()).await.unwrap_err();
        assert_eq!(failure.phase, PurchasePhase::Submit);
        assert_eq!(failure.kind, ErrorKind::Resource);
        assert!(failure.retryable);
        assert_eq!(failure.context["status"], "400");
        assert_eq!(failure.context["ticket"], "TICKET41");
        assert!(failure.context["ledger"].contains("BadInputsUTxO"));
        assert!(failure.status_message().starts_with("Submission failed: "));
    }

    #[tokio::test]
    async fn missing_state_utxo_stops_before_signing() {
        let protocol = TicketProtocol::mainnet();
        let mut mock = MockIndexer::with_ticket_state(&protocol, 41);
        mock.address_utxos.clear();
        let sdk = sdk_with(mock);
        let wallet = FakeWallet::signing_with(funded(), &one_signature());

        let failure = purchase_ticket(&sdk, &wallet, now()).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Resource);
        assert!(wallet.signed.lock().unwrap().is_empty());
    }

    #[test]
    fn failure_serializes_camel_case() {
        let failure = PurchaseFailure::new(PurchasePhase::Submit, &Error::NoSignatures);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["phase"], "submit");
        assert_eq!(json["kind"], "format");
        assert_eq!(json["retryable"], false);
    }
}
