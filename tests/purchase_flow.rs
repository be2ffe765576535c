use std::time::Duration;

use chrono::{TimeZone, Utc};
use ticket_booth_lib::{
    DiscoveryPolicy, LineWallet, PurchasePhase, WalletApi, discover_wallet, purchase_ticket,
};
use ticket_sdk::testing::{BUYER_ADDRESS, MockIndexer, SUBMITTED_TX_ID, pure_utxo};
use ticket_sdk::{ChainIndexer, ErrorKind, Network, TicketProtocol, TicketSdk};

fn witness_line(fill: u8) -> String {
    format!(
        "0xa10081825820{}5840{}\n",
        hex::encode([fill; 32]),
        hex::encode([fill; 64])
    )
}

fn sdk(counter: i64) -> TicketSdk<MockIndexer> {
    let protocol = TicketProtocol::mainnet();
    let mut mock = MockIndexer::with_ticket_state(&protocol, counter);
    mock.address_utxos.insert(
        BUYER_ADDRESS.to_string(),
        vec![pure_utxo(0xb0, 1, 420_000_000), pure_utxo(0xb1, 0, 7_500_000)],
    );
    TicketSdk::new(mock, protocol, Network::Mainnet)
}

#[tokio::test]
async fn discovered_line_wallet_buys_a_ticket() {
    let sdk = sdk(99);
    let indexer = sdk.indexer();
    let policy = DiscoveryPolicy {
        attempts: 2,
        interval: Duration::from_millis(1),
    };

    let reply = witness_line(4);
    let wallet = discover_wallet(
        move || {
            let reply = reply.clone();
            async move {
                let utxos = indexer.fetch_address_utxos(BUYER_ADDRESS, None).await.ok()?;
                Some(LineWallet::new(
                    utxos,
                    BUYER_ADDRESS,
                    std::io::Cursor::new(reply.into_bytes()),
                    Vec::new(),
                ))
            }
        },
        &policy,
    )
    .await
    .expect("buyer address is funded");
    assert_eq!(wallet.list_utxos().await.unwrap().len(), 2);

    let now = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let receipt = purchase_ticket(&sdk, &wallet, now).await.unwrap();
    assert_eq!(receipt.tx_id, SUBMITTED_TX_ID);
    assert_eq!(receipt.ticket_name, "TICKET99");
    assert_eq!(receipt.signatures, Some(1));
    assert_eq!(sdk.indexer().submitted().len(), 1);
}

#[tokio::test]
async fn malformed_wallet_reply_is_a_format_failure() {
    let sdk = sdk(3);
    let wallet = LineWallet::new(
        vec![pure_utxo(0xb0, 1, 420_000_000), pure_utxo(0xb1, 0, 7_500_000)],
        BUYER_ADDRESS,
        std::io::Cursor::new(b"not hex at all\n".to_vec()),
        Vec::new(),
    );

    let now = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let failure = purchase_ticket(&sdk, &wallet, now).await.unwrap_err();
    assert_eq!(failure.phase, PurchasePhase::Merge);
    assert_eq!(failure.kind, ErrorKind::Format);
    assert!(!failure.retryable);
    assert!(
        failure
            .status_message()
            .starts_with("Could not combine signatures: not valid hex")
    );
    assert!(sdk.indexer().submitted().is_empty());
}

#[tokio::test]
async fn unfunded_address_is_never_discovered() {
    let protocol = TicketProtocol::mainnet();
    let indexer = MockIndexer::with_ticket_state(&protocol, 0);
    let policy = DiscoveryPolicy {
        attempts: 3,
        interval: Duration::from_millis(1),
    };

    let probe = &indexer;
    let found = discover_wallet(
        move || async move {
            let utxos = probe.fetch_address_utxos(BUYER_ADDRESS, None).await.ok()?;
            (!utxos.is_empty()).then_some(utxos)
        },
        &policy,
    )
    .await;
    assert!(found.is_none());
    assert_eq!(
        indexer
            .calls()
            .iter()
            .filter(|c| c.starts_with("address_utxos"))
            .count(),
        3
    );
}
