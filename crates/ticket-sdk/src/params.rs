use chrono::{DateTime, TimeZone, Utc};

use crate::error::Result;
use crate::utxo::{AssetUnit, OutputRef};

/// Execution budget granted to one redeemer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

/// Fixed on-chain coordinates and policy of the ticket sale.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketProtocol {
    /// Policy id of the beacon token that marks the state UTxO.
    pub beacon_policy_id: String,
    /// Hex asset name of the beacon token.
    pub beacon_asset_name: String,
    /// Address holding the state UTxO (the issuer validator).
    pub issuer_address: String,
    /// UTxO carrying the issuer validator as a reference script.
    pub script_reference: OutputRef,
    /// Minting policy of ticket tokens (same validator as the issuer).
    pub ticket_policy_id: String,
    pub ticket_name_prefix: String,
    pub treasury_address: String,
    /// Price A applies strictly before this instant, price B from it on.
    pub price_cutoff: DateTime<Utc>,
    pub price_before_cutoff: u64,
    pub price_after_cutoff: u64,
    /// Headroom over the price demanded before building anything.
    pub fee_buffer: u64,
    pub min_collateral: u64,
    pub validity_window_secs: i64,
    /// Lovelace sent to the buyer alongside the minted ticket.
    pub buyer_output_lovelace: u64,
    pub spend_ex_units: ExUnits,
    pub mint_ex_units: ExUnits,
}

pub const MIN_COLLATERAL: u64 = 5_000_000;
pub const FEE_BUFFER: u64 = 5_000_000;
pub const BUYER_OUTPUT_LOVELACE: u64 = 2_000_000;
pub const VALIDITY_WINDOW_SECS: i64 = 2 * 60 * 60;

impl TicketProtocol {
    pub fn mainnet() -> Self {
        Self {
            beacon_policy_id: "c114e8985b67c9a45b3fe137e2fe8eb37c5428b949a73d68fa2093c9".into(),
            beacon_asset_name: "5469636b65745374617465".into(),
            issuer_address: "addr1w84mkhkdtdte96khge9ed5dp5e23geysv4r2kzrqr0s6tzseug8kt".into(),
            script_reference: OutputRef::new(
                "62d790b6ec15213990e9e4386ce8504a3dc6dc69a8f7cc3288d195a7cffa4a16",
                0,
            ),
            ticket_policy_id: "ebbb5ecd5b5792ead7464b96d1a1a6551464906546ab08601be1a58a".into(),
            ticket_name_prefix: "TICKET".into(),
            treasury_address: "addr1qxq2rd46g9nzs60e2afq86c9yjlc4yt67mpxu3c2xhfvkqw7g43kxqrtsv2465clf76nfseas55z49ygy302sahttm5srlsz9n".into(),
            price_cutoff: Utc
                .with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            price_before_cutoff: 400_000_000,
            price_after_cutoff: 500_000_000,
            fee_buffer: FEE_BUFFER,
            min_collateral: MIN_COLLATERAL,
            validity_window_secs: VALIDITY_WINDOW_SECS,
            buyer_output_lovelace: BUYER_OUTPUT_LOVELACE,
            spend_ex_units: ExUnits {
                mem: 1_000_000,
                steps: 400_000_000,
            },
            mint_ex_units: ExUnits {
                mem: 800_000,
                steps: 300_000_000,
            },
        }
    }

    /// `policy ++ name` unit of the beacon token.
    pub fn beacon_unit(&self) -> String {
        format!("{}{}", self.beacon_policy_id, self.beacon_asset_name)
    }

    pub fn ticket_unit(&self, ticket_name: &str) -> Result<AssetUnit> {
        AssetUnit::parse(&format!(
            "{}{}",
            self.ticket_policy_id,
            hex::encode(ticket_name.as_bytes())
        ))
    }
}
