pub mod address;
pub mod assembly;
pub mod chain;
pub mod datum;
pub mod error;
pub mod network;
pub mod params;
pub mod protocol;
pub mod script;
pub mod sdk;
pub mod selection;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tx;
pub mod utxo;
pub mod value;
pub mod witness;

// Core types
pub use address::Address;
pub use chain::{BlockfrostIndexer, ChainIndexer, IndexedOutput};
pub use error::{Error, ErrorKind, IndexerError, Result};
pub use network::{Network, SlotConfig};
pub use params::{ExUnits, TicketProtocol};
pub use protocol::ProtocolParameters;
pub use utxo::{AssetAmount, AssetUnit, OutputRef, Utxo};
pub use value::Value;

// Counter datum
pub use datum::{DatumError, decode_counter_bytes, decode_counter_datum, encode_counter_datum};

// Purchase pipeline
pub use assembly::{DraftTransaction, PurchaseAssemblyInputs, assemble_ticket_purchase};
pub use script::{PlutusVersion, ScriptReference, resolve_script_reference};
pub use sdk::{PreparedPurchase, TicketSdk, WalletSnapshot};
pub use selection::{check_balance, select_collateral, select_inputs, ticket_price, total_lovelace};
pub use state::{TicketState, read_ticket_state};

// Signing
pub use witness::{SignedTransaction, WalletResponse, merge_wallet_witnesses, normalize_hex};
