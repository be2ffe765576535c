use serde::Deserialize;

/// Network variants for Cardano.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

/// Shelley-era slot origin: slots are one second long from `zero_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    pub zero_time: i64,
    pub zero_slot: u64,
}

impl Network {
    pub fn is_mainnet(self) -> bool {
        matches!(self, Network::Mainnet)
    }

    /// Network id carried in the low nibble of address headers.
    pub fn network_id(self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Preprod | Network::Preview => 0,
        }
    }

    pub fn address_hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "addr",
            Network::Preprod | Network::Preview => "addr_test",
        }
    }

    pub fn blockfrost_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
            Network::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Network::Preview => "https://cardano-preview.blockfrost.io/api/v0",
        }
    }

    pub fn slot_config(self) -> SlotConfig {
        match self {
            Network::Mainnet => SlotConfig {
                zero_time: 1_596_059_091,
                zero_slot: 4_492_800,
            },
            Network::Preprod => SlotConfig {
                zero_time: 1_655_769_600,
                zero_slot: 86_400,
            },
            Network::Preview => SlotConfig {
                zero_time: 1_666_656_000,
                zero_slot: 0,
            },
        }
    }

    /// Convert POSIX seconds to an absolute slot number. Times before the
    /// Shelley origin clamp to `zero_slot`.
    pub fn unix_to_slot(self, unix_secs: i64) -> u64 {
        let config = self.slot_config();
        let elapsed = unix_secs.saturating_sub(config.zero_time).max(0) as u64;
        config.zero_slot + elapsed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "cardano" => Ok(Network::Mainnet),
            "preprod" | "cardano-preprod" => Ok(Network::Preprod),
            "preview" | "cardano-preview" => Ok(Network::Preview),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_slot_matches_shelley_origin() {
        assert_eq!(Network::Mainnet.unix_to_slot(1_596_059_091), 4_492_800);
        assert_eq!(Network::Mainnet.unix_to_slot(1_596_059_091 + 7_200), 4_500_000);
    }

    #[test]
    fn slots_before_origin_clamp() {
        assert_eq!(Network::Preview.unix_to_slot(0), 0);
        assert_eq!(Network::Preprod.unix_to_slot(1_655_769_599), 86_400);
    }

    #[test]
    fn parses_names() {
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("preprod".parse::<Network>().unwrap(), Network::Preprod);
        assert_eq!("cardano-preview".parse::<Network>().unwrap(), Network::Preview);
        assert!("liquid".parse::<Network>().is_err());
    }
}
