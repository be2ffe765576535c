pub mod config;
pub mod purchase;
pub mod wallet;

pub use config::{AppConfig, ConfigError};
pub use purchase::{PurchaseFailure, PurchasePhase, PurchaseReceipt, purchase_ticket};
pub use wallet::{DiscoveryPolicy, LineWallet, WalletApi, discover_wallet};
