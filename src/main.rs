use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use ticket_booth_lib::{AppConfig, LineWallet, discover_wallet, purchase_ticket};
use ticket_sdk::{
    BlockfrostIndexer, ChainIndexer, SignedTransaction, TicketSdk, WalletResponse,
    WalletSnapshot, merge_wallet_witnesses, normalize_hex,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,rustls=warn";

#[derive(Parser, Debug)]
#[command(author, version, about = "Buy event tickets with a Cardano wallet", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON config file
    #[arg(short, long, env = "TICKET_BOOTH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an unsigned purchase transaction funded from an address
    Draft {
        /// Buyer address (bech32 or hex); also receives change
        #[arg(short, long)]
        address: String,
    },

    /// Combine a wallet signing result with a draft
    Merge {
        #[arg(short, long)]
        draft: String,

        /// Witness set or full transaction returned by the wallet
        #[arg(short, long)]
        witness: String,
    },

    /// Submit a signed transaction
    Submit {
        #[arg(short, long)]
        tx: String,
    },

    /// Draft, sign over stdin/stdout, and submit in one go
    Buy {
        #[arg(short, long)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log::error!("{message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "debug,reqwest=warn,hyper=warn,rustls=warn"
    } else {
        DEFAULT_FILTER
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn connect(
    config_path: Option<&Path>,
) -> Result<(AppConfig, TicketSdk<BlockfrostIndexer>), String> {
    let config = AppConfig::load(config_path).map_err(|e| e.to_string())?;
    let sdk = config.sdk().map_err(|e| e.to_string())?;
    log::debug!("using {} on {}", sdk.indexer().base_url(), config.network);
    Ok((config, sdk))
}

async fn run(args: Args) -> Result<(), String> {
    let config_path = args.config.as_deref();

    match args.command {
        Command::Merge { draft, witness } => {
            let signed = merge_wallet_witnesses(&draft, &witness).map_err(|e| e.to_string())?;
            if let Some(count) = signed.signatures() {
                log::info!("transaction carries {count} signature(s)");
            }
            println!("{}", signed.hex());
            Ok(())
        }
        Command::Draft { address } => {
            let (_, sdk) = connect(config_path)?;
            let utxos = sdk
                .indexer()
                .fetch_address_utxos(&address, None)
                .await
                .map_err(|e| e.to_string())?;
            let snapshot = WalletSnapshot {
                utxos,
                change_address: address,
                collateral: Vec::new(),
            };
            let prepared = sdk
                .prepare_purchase(&snapshot, Utc::now())
                .await
                .map_err(|e| e.to_string())?;
            let draft = &prepared.draft;
            log::info!(
                "{} for {} lovelace, fee {}, valid until slot {}",
                draft.ticket_name,
                draft.price,
                draft.fee,
                draft.ttl
            );
            println!("{}", draft.hex());
            Ok(())
        }
        Command::Submit { tx } => {
            let (_, sdk) = connect(config_path)?;
            let bytes = hex::decode(normalize_hex(&tx)).map_err(|e| format!("not valid hex: {e}"))?;
            let signed = match WalletResponse::classify(bytes).map_err(|e| e.to_string())? {
                WalletResponse::Transaction(bytes) => SignedTransaction::Complete { bytes },
                WalletResponse::WitnessSet(_) => {
                    return Err("expected a full transaction, got a witness set".into());
                }
            };
            let tx_id = sdk.submit(&signed).await.map_err(|e| e.to_string())?;
            println!("{tx_id}");
            Ok(())
        }
        Command::Buy { address } => {
            let (config, sdk) = connect(config_path)?;
            let indexer = sdk.indexer();
            let buyer = address.as_str();
            let wallet = discover_wallet(
                move || async move {
                    match indexer.fetch_address_utxos(buyer, None).await {
                        Ok(utxos) if !utxos.is_empty() => Some(LineWallet::stdio(utxos, buyer)),
                        Ok(_) => {
                            log::info!("no UTxOs at {buyer} yet");
                            None
                        }
                        Err(e) => {
                            log::warn!("wallet lookup failed: {e}");
                            None
                        }
                    }
                },
                &config.discovery,
            )
            .await
            .ok_or_else(|| format!("no spendable UTxOs found at {address}"))?;

            let receipt = purchase_ticket(&sdk, &wallet, Utc::now())
                .await
                .map_err(|failure| failure.status_message())?;
            let summary = serde_json::to_string_pretty(&receipt).map_err(|e| e.to_string())?;
            println!("{summary}");
            Ok(())
        }
    }
}
