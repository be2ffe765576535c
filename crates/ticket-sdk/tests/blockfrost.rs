use mockito::Server;
use serde_json::json;
use ticket_sdk::script::resolve_script_reference;
use ticket_sdk::{
    BlockfrostIndexer, ChainIndexer, Error, IndexerError, OutputRef, PlutusVersion,
    TicketProtocol, read_ticket_state,
};

const KEY: &str = "mainnetTestKey";
const SCRIPT_HASH: &str = "ebbb5ecd5b5792ead7464b96d1a1a6551464906546ab08601be1a58a";

fn utxo_json(tx_byte: u8, index: u32, lovelace: u64) -> serde_json::Value {
    json!({
        "address": "addr1q8lhsqwte7x5thy7pgs9d6dnf8lne5vm89vxm9s5s0nyfal92np3g2l2d0xqhj6fnt2pqt8wt5ew0g6g8mgcyy9xq3ps3uarlw",
        "tx_hash": hex::encode([tx_byte; 32]),
        "output_index": index,
        "amount": [{"unit": "lovelace", "quantity": lovelace.to_string()}],
        "block": "ignored",
        "data_hash": null,
        "inline_datum": null,
        "reference_script_hash": null
    })
}

fn indexer(server: &Server) -> BlockfrostIndexer {
    BlockfrostIndexer::new(&server.url(), KEY).unwrap()
}

#[tokio::test]
async fn address_utxos_follow_pages_and_send_the_key() {
    let mut server = Server::new_async().await;
    let page1: Vec<_> = (0..100).map(|i| utxo_json(1, i, 1_000_000)).collect();
    let page2 = vec![utxo_json(2, 0, 7_000_000)];

    let m1 = server
        .mock("GET", "/addresses/addr_x/utxos?page=1")
        .match_header("project_id", KEY)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::to_string(&page1).unwrap())
        .create_async()
        .await;
    let m2 = server
        .mock("GET", "/addresses/addr_x/utxos?page=2")
        .match_header("project_id", KEY)
        .with_status(200)
        .with_body(serde_json::to_string(&page2).unwrap())
        .create_async()
        .await;

    let utxos = indexer(&server)
        .fetch_address_utxos("addr_x", None)
        .await
        .unwrap();
    assert_eq!(utxos.len(), 101);
    assert_eq!(utxos[100].lovelace(), 7_000_000);
    m1.assert_async().await;
    m2.assert_async().await;
}

#[tokio::test]
async fn unknown_address_is_an_empty_list() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/addresses/addr_empty/utxos?page=1")
        .with_status(404)
        .with_body(r#"{"status_code":404,"error":"Not Found","message":"The requested component has not been found."}"#)
        .create_async()
        .await;

    let utxos = indexer(&server)
        .fetch_address_utxos("addr_empty", None)
        .await
        .unwrap();
    assert!(utxos.is_empty());
}

#[tokio::test]
async fn state_reader_decodes_counter_from_asset_filtered_query() {
    let protocol = TicketProtocol::mainnet();
    let mut server = Server::new_async().await;
    let path = format!(
        "/addresses/{}/utxos/{}?page=1",
        protocol.issuer_address,
        protocol.beacon_unit()
    );
    server
        .mock("GET", path.as_str())
        .with_status(200)
        .with_body(
            json!([{
                "address": protocol.issuer_address,
                "tx_hash": hex::encode([0x5a; 32]),
                "output_index": 0,
                "amount": [
                    {"unit": "lovelace", "quantity": "2000000"},
                    {"unit": protocol.beacon_unit(), "quantity": "1"}
                ],
                "inline_datum": "d879811829",
                "reference_script_hash": null
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let state = read_ticket_state(&indexer(&server), &protocol).await.unwrap();
    assert_eq!(state.counter, 41);
    assert_eq!(state.ticket_name(&protocol), "TICKET41");
}

#[tokio::test]
async fn script_reference_resolves_version_and_size() {
    let mut server = Server::new_async().await;
    let tx_hash = hex::encode([0x62; 32]);
    server
        .mock("GET", format!("/txs/{tx_hash}/utxos").as_str())
        .with_status(200)
        .with_body(
            json!({
                "hash": tx_hash,
                "inputs": [],
                "outputs": [
                    {"address": "addr1x", "output_index": 0, "amount": [{"unit": "lovelace", "quantity": "1"}]},
                    {"address": "addr1y", "output_index": 1, "amount": [{"unit": "lovelace", "quantity": "1"}],
                     "reference_script_hash": SCRIPT_HASH}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", format!("/scripts/{SCRIPT_HASH}").as_str())
        .with_status(200)
        .with_body(json!({"script_hash": SCRIPT_HASH, "type": "plutusV2", "serialised_size": 3}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", format!("/scripts/{SCRIPT_HASH}/cbor").as_str())
        .with_status(200)
        .with_body(json!({"cbor": "4e4d01"}).to_string())
        .create_async()
        .await;

    let reference = resolve_script_reference(&indexer(&server), &OutputRef::new(tx_hash, 1))
        .await
        .unwrap();
    assert_eq!(reference.version, PlutusVersion::V2);
    assert_eq!(reference.size, 3);
    assert_eq!(reference.script_hash, SCRIPT_HASH);
}

#[tokio::test]
async fn protocol_parameters_parse_cost_models() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/epochs/latest/parameters")
        .with_status(200)
        .with_body(
            json!({
                "epoch": 500,
                "min_fee_a": 44,
                "min_fee_b": 155381,
                "price_mem": 0.0577,
                "price_step": 0.0000721,
                "coins_per_utxo_size": "4310",
                "collateral_percent": 150,
                "min_fee_ref_script_cost_per_byte": 15,
                "cost_models_raw": {"PlutusV2": [1, 2], "PlutusV3": [3, -4, 5]}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let params = indexer(&server).fetch_protocol_parameters().await.unwrap();
    assert_eq!(params.coins_per_utxo_byte, 4310);
    assert_eq!(params.cost_model(PlutusVersion::V3).unwrap(), &[3, -4, 5]);
    assert!(matches!(
        params.cost_model(PlutusVersion::V1),
        Err(Error::ProtocolParameters(_))
    ));
}

#[tokio::test]
async fn submit_posts_cbor_and_returns_tx_id() {
    let mut server = Server::new_async().await;
    let tx_id = "ab".repeat(32);
    let m = server
        .mock("POST", "/tx/submit")
        .match_header("project_id", KEY)
        .match_header("content-type", "application/cbor")
        .with_status(200)
        .with_body(format!("\"{tx_id}\""))
        .create_async()
        .await;

    let submitted = indexer(&server)
        .submit_transaction(&[0x84, 0xa0, 0xa0, 0xf5, 0xf6])
        .await
        .unwrap();
    assert_eq!(submitted, tx_id);
    m.assert_async().await;
}

#[tokio::test]
async fn rejected_submission_keeps_ledger_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/tx/submit")
        .with_status(400)
        .with_body(
            json!({
                "status_code": 400,
                "error": "Bad Request",
                "message": "\"transaction submit error ShelleyTxValidationError ShelleyBasedEraConway (ApplyTxError (ConwayUtxowFailure (UtxoFailure (BadInputsUTxO ...))))\""
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = indexer(&server).submit_transaction(&[0x80]).await.unwrap_err();
    assert!(err.is_stale_input());
    match &err {
        IndexerError::HttpStatus { status, message } => {
            assert_eq!(*status, 400);
            assert!(message.starts_with("Bad Request: "));
        }
        other => panic!("expected HTTP status error, got {other:?}"),
    }
    assert!(Error::from(err).is_retryable());
}

#[tokio::test]
async fn forbidden_key_is_reported_not_retried() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/epochs/latest/parameters")
        .with_status(403)
        .with_body(r#"{"status_code":403,"error":"Forbidden","message":"Invalid project token."}"#)
        .create_async()
        .await;

    let err = Error::from(
        indexer(&server)
            .fetch_protocol_parameters()
            .await
            .unwrap_err(),
    );
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Invalid project token."));
}

#[test]
fn empty_key_is_missing_key() {
    assert!(matches!(
        BlockfrostIndexer::new("http://localhost", "  "),
        Err(Error::MissingApiKey)
    ));
}
