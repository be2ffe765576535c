use chrono::{DateTime, Utc};

use crate::address::Address;
use crate::assembly::{DraftTransaction, PurchaseAssemblyInputs, assemble_ticket_purchase};
use crate::chain::ChainIndexer;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::params::TicketProtocol;
use crate::script::{ScriptReference, resolve_script_reference};
use crate::selection::{check_balance, select_collateral, ticket_price};
use crate::state::{TicketState, read_ticket_state};
use crate::utxo::Utxo;
use crate::witness::{SignedTransaction, merge_wallet_witnesses};

/// The wallet's view at the start of one purchase attempt.
#[derive(Debug, Clone, Default)]
pub struct WalletSnapshot {
    pub utxos: Vec<Utxo>,
    /// Bech32 or hex, as the wallet reports it.
    pub change_address: String,
    /// UTxOs the wallet itself designates as collateral. When empty the
    /// collateral is picked from `utxos`.
    pub collateral: Vec<Utxo>,
}

/// Result of a successful draft build.
#[derive(Debug, Clone)]
pub struct PreparedPurchase {
    pub draft: DraftTransaction,
    pub state: TicketState,
    pub script: ScriptReference,
    pub collateral: Utxo,
}

/// Ticket purchase pipeline over a [`ChainIndexer`].
///
/// Stateless between attempts: every call to [`prepare_purchase`] reads the
/// counter afresh, so a retry after a lost race picks up the new state.
///
/// [`prepare_purchase`]: TicketSdk::prepare_purchase
pub struct TicketSdk<I> {
    indexer: I,
    protocol: TicketProtocol,
    network: Network,
}

impl<I: ChainIndexer> TicketSdk<I> {
    pub fn new(indexer: I, protocol: TicketProtocol, network: Network) -> Self {
        Self {
            indexer,
            protocol,
            network,
        }
    }

    pub fn indexer(&self) -> &I {
        &self.indexer
    }

    pub fn protocol(&self) -> &TicketProtocol {
        &self.protocol
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Check funds, read the ticket state and compose an unsigned draft.
    ///
    /// Balance and collateral are checked against the snapshot before the
    /// indexer is contacted.
    pub async fn prepare_purchase(
        &self,
        wallet: &WalletSnapshot,
        now: DateTime<Utc>,
    ) -> Result<PreparedPurchase> {
        let price = ticket_price(now, &self.protocol);
        let available = check_balance(&wallet.utxos, price, self.protocol.fee_buffer)?;
        log::info!(
            "wallet holds {available} lovelace; ticket price {price} plus {} buffer",
            self.protocol.fee_buffer
        );

        let pool = if wallet.collateral.is_empty() {
            &wallet.utxos
        } else {
            &wallet.collateral
        };
        let collateral = select_collateral(pool, self.protocol.min_collateral)?;
        log::debug!("collateral {} ({} lovelace)", collateral.out_ref, collateral.lovelace());

        let change_address = Address::parse(&wallet.change_address)?;
        if change_address.network_id() != self.network.network_id() {
            return Err(Error::InvalidAddress(format!(
                "{} is not a {} address",
                wallet.change_address, self.network
            )));
        }

        let state = read_ticket_state(&self.indexer, &self.protocol).await?;
        let script = resolve_script_reference(&self.indexer, &self.protocol.script_reference).await?;
        let params = self.indexer.fetch_protocol_parameters().await?;

        let draft = assemble_ticket_purchase(&PurchaseAssemblyInputs {
            protocol: self.protocol.clone(),
            network: self.network,
            params,
            state: state.clone(),
            script: script.clone(),
            wallet_utxos: wallet.utxos.clone(),
            collateral: collateral.clone(),
            change_address,
            now,
        })?;

        Ok(PreparedPurchase {
            draft,
            state,
            script,
            collateral,
        })
    }

    /// Combine the wallet's signing response with the draft.
    pub fn finalize(&self, draft_hex: &str, wallet_hex: &str) -> Result<SignedTransaction> {
        merge_wallet_witnesses(draft_hex, wallet_hex)
    }

    pub async fn submit(&self, signed: &SignedTransaction) -> Result<String> {
        let tx_id = self.indexer.submit_transaction(signed.bytes()).await?;
        log::info!("submitted transaction {tx_id}");
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BUYER_ADDRESS, MockIndexer, pure_utxo};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
    }

    fn sdk() -> TicketSdk<MockIndexer> {
        let protocol = TicketProtocol::mainnet();
        TicketSdk::new(
            MockIndexer::with_ticket_state(&protocol, 41),
            protocol,
            Network::Mainnet,
        )
    }

    #[tokio::test]
    async fn balance_shortfall_never_reaches_the_indexer() {
        let sdk = sdk();
        let wallet = WalletSnapshot {
            utxos: vec![pure_utxo(1, 0, 100_000_000)],
            change_address: BUYER_ADDRESS.into(),
            collateral: Vec::new(),
        };
        let err = sdk.prepare_purchase(&wallet, now()).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert!(sdk.indexer().calls().is_empty());
    }

    #[tokio::test]
    async fn change_address_must_match_network() {
        let protocol = TicketProtocol::mainnet();
        let sdk = TicketSdk::new(
            MockIndexer::with_ticket_state(&protocol, 1),
            protocol,
            Network::Preprod,
        );
        let wallet = WalletSnapshot {
            utxos: vec![pure_utxo(1, 0, 500_000_000), pure_utxo(2, 0, 6_000_000)],
            change_address: BUYER_ADDRESS.into(),
            collateral: Vec::new(),
        };
        assert!(matches!(
            sdk.prepare_purchase(&wallet, now()).await,
            Err(Error::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn wallet_designated_collateral_is_preferred() {
        let sdk = sdk();
        let wallet = WalletSnapshot {
            utxos: vec![pure_utxo(1, 0, 450_000_000), pure_utxo(2, 0, 6_000_000)],
            change_address: BUYER_ADDRESS.into(),
            collateral: vec![pure_utxo(3, 0, 8_000_000)],
        };
        let prepared = sdk.prepare_purchase(&wallet, now()).await.unwrap();
        assert_eq!(prepared.collateral.out_ref, pure_utxo(3, 0, 8_000_000).out_ref);
    }
}
