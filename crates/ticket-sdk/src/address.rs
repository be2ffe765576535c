use bech32::{Bech32, Hrp};

use crate::error::{Error, Result};

/// A Shelley address kept as its raw header + credential bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    bytes: Vec<u8>,
}

impl Address {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        // header + 28-byte payment credential at minimum
        if bytes.len() < 29 {
            return Err(Error::InvalidAddress(format!(
                "address is {} bytes, expected at least 29",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn from_bech32(s: &str) -> Result<Self> {
        let (hrp, data) =
            bech32::decode(s.trim()).map_err(|e| Error::InvalidAddress(format!("{s}: {e}")))?;
        if !hrp.as_str().starts_with("addr") {
            return Err(Error::InvalidAddress(format!(
                "unexpected prefix {} in {s}",
                hrp.as_str()
            )));
        }
        Self::from_bytes(data)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| Error::InvalidAddress(format!("{s}: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Accept either a bech32 address or the hex form wallets return.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("addr") {
            Self::from_bech32(s)
        } else {
            Self::from_hex(s)
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn network_id(&self) -> u8 {
        self.bytes[0] & 0x0f
    }

    /// Payment part of the address (key hash or script hash).
    pub fn payment_credential(&self) -> &[u8] {
        &self.bytes[1..29]
    }

    pub fn to_bech32(&self) -> String {
        let prefix = if self.network_id() == 1 {
            "addr"
        } else {
            "addr_test"
        };
        // Both prefixes are valid HRPs and addresses are far below the
        // bech32 code length limit.
        let hrp = Hrp::parse_unchecked(prefix);
        bech32::encode::<Bech32>(hrp, &self.bytes).unwrap_or_else(|_| hex::encode(&self.bytes))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_bech32())
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUYER: &str = "addr1q8lhsqwte7x5thy7pgs9d6dnf8lne5vm89vxm9s5s0nyfal92np3g2l2d0xqhj6fnt2pqt8wt5ew0g6g8mgcyy9xq3ps3uarlw";
    const BUYER_HEX: &str = "01ff7801cbcf8d45dc9e0a2056e9b349ff3cd19b39586d961483e644f7e554c3142bea6bcc0bcb499ad4102cee5d32e7a3483ed18210a60443";

    #[test]
    fn bech32_and_hex_forms_agree() {
        let from_bech = Address::from_bech32(BUYER).unwrap();
        let from_hex = Address::from_hex(BUYER_HEX).unwrap();
        assert_eq!(from_bech, from_hex);
        assert_eq!(from_bech.network_id(), 1);
        assert_eq!(from_hex.to_bech32(), BUYER);
    }

    #[test]
    fn parse_dispatches_on_prefix() {
        assert_eq!(Address::parse(BUYER).unwrap().as_bytes().len(), 57);
        assert_eq!(Address::parse(BUYER_HEX).unwrap().as_bytes()[0], 0x01);
    }

    #[test]
    fn rejects_bad_checksum_and_short_payloads() {
        let mut corrupted = BUYER.to_string();
        corrupted.pop();
        corrupted.push('q');
        assert!(Address::from_bech32(&corrupted).is_err());
        assert!(Address::from_hex("01ff").is_err());
    }
}
