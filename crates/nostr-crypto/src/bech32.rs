//! Bech32 (BIP-173) encoding as used by NIP-19 `npub`/`nsec` strings.
//!
//! The codec works on 5-bit symbols; [`convert_bits`] regroups bytes to and
//! from that width.

use thiserror::Error;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [
    0x3b6a_57b2,
    0x2650_8e6d,
    0x1ea1_19fa,
    0x3d42_33dd,
    0x2a14_62b3,
];
const CHECKSUM_LEN: usize = 6;
const SEPARATOR: char = '1';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bech32Error {
    #[error("missing separator")]
    MissingSeparator,
    #[error("empty human-readable part")]
    EmptyHrp,
    #[error("invalid human-readable part character: {0:?}")]
    InvalidHrpChar(char),
    #[error("data part too short: {0} symbols")]
    DataTooShort(usize),
    #[error("invalid data character: {0:?}")]
    InvalidChar(char),
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("symbol out of range: {0}")]
    SymbolOutOfRange(u8),
    #[error("invalid bit padding")]
    InvalidPadding,
    #[error("unsupported group width: {from} -> {to} bits")]
    InvalidBitWidth { from: u32, to: u32 },
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u32 {
    let mut chk: u32 = 1;
    for value in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ value as u32;
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 0x1f));
    out
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let values = hrp_expand(hrp)
        .into_iter()
        .chain(data.iter().copied())
        .chain([0u8; CHECKSUM_LEN]);
    let pm = polymod(values) ^ 1;
    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, slot) in checksum.iter_mut().enumerate() {
        *slot = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    polymod(hrp_expand(hrp).into_iter().chain(data.iter().copied())) == 1
}

fn validate_hrp(hrp: &str) -> Result<(), Bech32Error> {
    if hrp.is_empty() {
        return Err(Bech32Error::EmptyHrp);
    }
    match hrp.chars().find(|c| !('!'..='~').contains(c)) {
        Some(bad) => Err(Bech32Error::InvalidHrpChar(bad)),
        None => Ok(()),
    }
}

/// Encodes 5-bit `data` under `hrp`, appending the six-symbol checksum.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, Bech32Error> {
    let hrp = hrp.to_lowercase();
    validate_hrp(&hrp)?;
    if let Some(bad) = data.iter().find(|v| **v > 31) {
        return Err(Bech32Error::SymbolOutOfRange(*bad));
    }

    let checksum = create_checksum(&hrp, data);
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    out.push_str(&hrp);
    out.push(SEPARATOR);
    for symbol in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[*symbol as usize] as char);
    }
    Ok(out)
}

/// Decodes a bech32 string into its human-readable part and 5-bit payload
/// (checksum stripped).
pub fn decode(input: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let lowered = input.to_lowercase();
    let pos = lowered.rfind(SEPARATOR).ok_or(Bech32Error::MissingSeparator)?;
    let (hrp, rest) = lowered.split_at(pos);
    let data_part = &rest[1..];

    validate_hrp(hrp)?;
    if data_part.len() < CHECKSUM_LEN {
        return Err(Bech32Error::DataTooShort(data_part.len()));
    }

    let mut data = Vec::with_capacity(data_part.len());
    for c in data_part.chars() {
        let symbol = CHARSET
            .iter()
            .position(|s| *s as char == c)
            .ok_or(Bech32Error::InvalidChar(c))?;
        data.push(symbol as u8);
    }

    if !verify_checksum(hrp, &data) {
        return Err(Bech32Error::InvalidChecksum);
    }

    data.truncate(data.len() - CHECKSUM_LEN);
    Ok((hrp.to_string(), data))
}

/// Regroups `data` from `from_bits`-wide values into `to_bits`-wide values.
///
/// With `pad` the final partial group is zero-padded. Without it, leftover
/// bits must be fewer than `from_bits` and all zero. Both widths must be in
/// `1..=8`.
pub fn convert_bits(
    data: &[u8],
    from_bits: u32,
    to_bits: u32,
    pad: bool,
) -> Result<Vec<u8>, Bech32Error> {
    if !(1..=8).contains(&from_bits) || !(1..=8).contains(&to_bits) {
        return Err(Bech32Error::InvalidBitWidth {
            from: from_bits,
            to: to_bits,
        });
    }
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to_bits) - 1;
    let max_acc: u32 = (1 << (from_bits + to_bits - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from_bits as usize / to_bits as usize + 1);

    for value in data {
        let value = *value as u32;
        if value >> from_bits != 0 {
            return Err(Bech32Error::SymbolOutOfRange(value as u8));
        }
        acc = ((acc << from_bits) | value) & max_acc;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to_bits - bits)) & max_value) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & max_value) != 0 {
        return Err(Bech32Error::InvalidPadding);
    }

    Ok(out)
}

/// Encodes raw bytes (8-bit) under `hrp`.
pub fn encode_bytes(hrp: &str, bytes: &[u8]) -> Result<String, Bech32Error> {
    let data = convert_bits(bytes, 8, 5, true)?;
    encode(hrp, &data)
}

/// Decodes to raw bytes (8-bit), returning the human-readable part alongside.
pub fn decode_bytes(input: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let (hrp, data) = decode(input)?;
    let bytes = convert_bits(&data, 5, 8, false)?;
    Ok((hrp, bytes))
}
