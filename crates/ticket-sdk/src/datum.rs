//! Minimal reader/writer for the ticket counter datum.
//!
//! The state UTxO carries `Constr 0 [counter]` as inline data, which in CBOR
//! is `d8 79` (tag 121) followed by a short definite-length list whose first
//! element is an integer. Only that shape is understood here.

use thiserror::Error;

/// CBOR tag 121 (`Constr 0`), encoded as a one-byte-argument tag.
const CONSTR_0_TAG: [u8; 2] = [0xd8, 0x79];

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_ARRAY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DatumError {
    #[error("no inline datum")]
    Missing,

    #[error("datum is not valid hex")]
    InvalidHex,

    #[error("datum is too short")]
    TooShort,

    #[error("datum does not start with the Constr 0 tag")]
    WrongTag,

    #[error("datum fields are not a short list")]
    MalformedList,

    #[error("datum field list is empty")]
    EmptyList,

    #[error("datum integer is truncated")]
    TruncatedInteger,

    #[error("datum field is not a supported integer")]
    UnsupportedInteger,

    #[error("counter {0} cannot be encoded")]
    OutOfRange(i64),
}

/// Decode the first integer field of a hex-encoded `Constr 0 [int, ..]`.
pub fn decode_counter_datum(hex_datum: &str) -> Result<i64, DatumError> {
    let bytes = hex::decode(hex_datum.trim()).map_err(|_| DatumError::InvalidHex)?;
    decode_counter_bytes(&bytes)
}

pub fn decode_counter_bytes(bytes: &[u8]) -> Result<i64, DatumError> {
    if bytes.len() < 4 {
        return Err(DatumError::TooShort);
    }
    if bytes[..2] != CONSTR_0_TAG {
        return Err(DatumError::WrongTag);
    }

    let header = bytes[2];
    if header >> 5 != MAJOR_ARRAY || header & 0x1f >= 24 {
        return Err(DatumError::MalformedList);
    }
    if header & 0x1f == 0 {
        return Err(DatumError::EmptyList);
    }

    read_int(&bytes[3..])
}

fn read_int(bytes: &[u8]) -> Result<i64, DatumError> {
    let (&initial, rest) = bytes.split_first().ok_or(DatumError::TruncatedInteger)?;
    let major = initial >> 5;
    let selector = initial & 0x1f;

    if major != MAJOR_UNSIGNED && major != MAJOR_NEGATIVE {
        return Err(DatumError::UnsupportedInteger);
    }

    let width = match selector {
        0..=23 => 0,
        24 => 1,
        25 => 2,
        26 => 4,
        _ => return Err(DatumError::UnsupportedInteger),
    };

    let magnitude = if width == 0 {
        u64::from(selector)
    } else {
        let field = rest.get(..width).ok_or(DatumError::TruncatedInteger)?;
        field.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    };

    // At most 32 bits of magnitude, so both branches fit in i64.
    let magnitude = magnitude as i64;
    if major == MAJOR_NEGATIVE {
        Ok(-1 - magnitude)
    } else {
        Ok(magnitude)
    }
}

/// Encode `Constr 0 [counter]` using the shortest integer form.
pub fn encode_counter_datum(counter: i64) -> Result<Vec<u8>, DatumError> {
    let (major, magnitude) = if counter >= 0 {
        (MAJOR_UNSIGNED, counter as u64)
    } else {
        (MAJOR_NEGATIVE, (-1 - counter) as u64)
    };
    if magnitude > u64::from(u32::MAX) {
        return Err(DatumError::OutOfRange(counter));
    }

    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&CONSTR_0_TAG);
    out.push((MAJOR_ARRAY << 5) | 1);

    let major = major << 5;
    match magnitude {
        0..=23 => out.push(major | magnitude as u8),
        24..=0xff => out.extend_from_slice(&[major | 24, magnitude as u8]),
        0x100..=0xffff => {
            out.push(major | 25);
            out.extend_from_slice(&(magnitude as u16).to_be_bytes());
        }
        _ => {
            out.push(major | 26);
            out.extend_from_slice(&(magnitude as u32).to_be_bytes());
        }
    }
    Ok(out)
}
