//! Match share-code codec.
//!
//! A share code packs `(match_id, outcome_id, token)` into a 144-bit value,
//! byte-reverses it and spells the result out as 25 digits of a 57-symbol
//! alphabet, grouped `CSGO-xxxxx-xxxxx-xxxxx-xxxxx-xxxxx`.

use thiserror::Error;

/// Symbols used by the textual representation.
const ALPHABET: &[u8; 57] = b"ABCDEFGHJKLMNOPQRSTUVWXYZabcdefhijkmnopqrstuvwxyz23456789";

/// Fixed prefix of every share code.
const PREFIX: &str = "CSGO";

const GROUPS: usize = 5;
const GROUP_LEN: usize = 5;
const DIGITS: usize = GROUPS * GROUP_LEN;

/// The packed value is 18 bytes (144 bits) wide.
const VALUE_BYTES: usize = 18;

/// Share-code decoding error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareCodeError {
    /// The string does not match the fixed grouped-alphabet pattern.
    #[error("invalid share code format")]
    InvalidFormat,
}

/// The three identifiers carried by a share code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareCode {
    /// Match identifier.
    pub match_id: u64,
    /// Outcome identifier.
    pub outcome_id: u64,
    /// Access token.
    pub token: u16,
}

/// Encode the three identifiers as a share code string.
#[must_use]
pub fn encode(match_id: u64, outcome_id: u64, token: u16) -> String {
    // The packed (token << 128 | outcome << 64 | match) value is byte-reversed
    // before digit extraction, which leaves the little-endian field encodings
    // concatenated match-first as one big-endian 144-bit number.
    let mut value = [0u8; VALUE_BYTES];
    value[0..8].copy_from_slice(&match_id.to_le_bytes());
    value[8..16].copy_from_slice(&outcome_id.to_le_bytes());
    value[16..18].copy_from_slice(&token.to_le_bytes());

    let mut out = String::with_capacity(PREFIX.len() + GROUPS * (GROUP_LEN + 1));
    out.push_str(PREFIX);

    for digit in 0..DIGITS {
        if digit % GROUP_LEN == 0 {
            out.push('-');
        }
        out.push(char::from(ALPHABET[div_mod_base(&mut value)]));
    }

    out
}

/// Decode a share code string.
///
/// # Errors
/// Returns [`ShareCodeError::InvalidFormat`] unless the input is exactly the
/// prefix plus five hyphen-separated groups of five alphabet characters.
pub fn decode(code: &str) -> Result<ShareCode, ShareCodeError> {
    let digits = parse_digits(code)?;

    // Rebuild the 144-bit value most-significant digit first; anything
    // overflowing 144 bits is masked off, matching the packing on encode.
    let mut value = [0u8; VALUE_BYTES];
    for &digit in digits.iter().rev() {
        mul_add_base(&mut value, digit);
    }

    Ok(ShareCode {
        match_id: u64::from_le_bytes(value[0..8].try_into().unwrap()),
        outcome_id: u64::from_le_bytes(value[8..16].try_into().unwrap()),
        token: u16::from_le_bytes(value[16..18].try_into().unwrap()),
    })
}

/// Validate the textual pattern and return the 25 alphabet indices in order.
fn parse_digits(code: &str) -> Result<Vec<u8>, ShareCodeError> {
    let mut groups = code.split('-');
    if groups.next() != Some(PREFIX) {
        return Err(ShareCodeError::InvalidFormat);
    }

    let mut digits = Vec::with_capacity(DIGITS);
    for _ in 0..GROUPS {
        let group = groups.next().ok_or(ShareCodeError::InvalidFormat)?;
        if group.len() != GROUP_LEN {
            return Err(ShareCodeError::InvalidFormat);
        }
        for byte in group.bytes() {
            let index = ALPHABET
                .iter()
                .position(|&c| c == byte)
                .ok_or(ShareCodeError::InvalidFormat)?;
            digits.push(index as u8);
        }
    }

    if groups.next().is_some() {
        return Err(ShareCodeError::InvalidFormat);
    }

    Ok(digits)
}

/// Divide the big-endian value by the alphabet size, returning the remainder.
fn div_mod_base(value: &mut [u8; VALUE_BYTES]) -> usize {
    let base = u32::try_from(ALPHABET.len()).unwrap_or(57);
    let mut rem: u32 = 0;
    for byte in value.iter_mut() {
        let cur = (rem << 8) | u32::from(*byte);
        *byte = (cur / base) as u8;
        rem = cur % base;
    }
    rem as usize
}

/// Multiply the big-endian value by the alphabet size and add one digit.
///
/// Carry past 144 bits is discarded.
fn mul_add_base(value: &mut [u8; VALUE_BYTES], digit: u8) {
    let base = u32::from(u8::try_from(ALPHABET.len()).unwrap_or(57));
    let mut carry = u32::from(digit);
    for byte in value.iter_mut().rev() {
        let cur = u32::from(*byte) * base + carry;
        *byte = (cur & 0xFF) as u8;
        carry = cur >> 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(match_id: u64, outcome_id: u64, token: u16) {
        let code = encode(match_id, outcome_id, token);
        let decoded = decode(&code).unwrap();
        assert_eq!(
            decoded,
            ShareCode {
                match_id,
                outcome_id,
                token
            },
            "code {code}"
        );
    }

    #[test]
    fn zero_encodes_to_all_first_symbol() {
        assert_eq!(encode(0, 0, 0), "CSGO-AAAAA-AAAAA-AAAAA-AAAAA-AAAAA");
    }

    #[test]
    fn matches_known_wire_codes() {
        // Codes produced by deployed encoders; pins the byte-reversal step.
        let code = "CSGO-dCGPQ-qPbyD-uN9Y3-trzZ9-F6oJN";
        assert_eq!(
            encode(3_230_642_215_713_177_793, 3_230_642_299_776_079_891, 53000),
            code
        );
        assert_eq!(
            decode(code),
            Ok(ShareCode {
                match_id: 3_230_642_215_713_177_793,
                outcome_id: 3_230_642_299_776_079_891,
                token: 53000,
            })
        );
    }

    #[test]
    fn round_trips_representative_values() {
        round_trip(0, 0, 0);
        round_trip(3_230_642_215_713_177_793, 3_230_642_299_776_079_891, 53000);
        round_trip(1, 2, 3);
        round_trip(u64::MAX, u64::MAX, u16::MAX);
    }

    #[test]
    fn rejects_wrong_prefix() {
        let code = encode(1, 2, 3).replacen("CSGO", "XSGO", 1);
        assert_eq!(decode(&code), Err(ShareCodeError::InvalidFormat));
    }

    #[test]
    fn rejects_wrong_group_lengths() {
        assert_eq!(
            decode("CSGO-AAAA-AAAAA-AAAAA-AAAAA-AAAAA"),
            Err(ShareCodeError::InvalidFormat)
        );
        assert_eq!(
            decode("CSGO-AAAAA-AAAAA-AAAAA-AAAAA"),
            Err(ShareCodeError::InvalidFormat)
        );
        assert_eq!(
            decode("CSGO-AAAAA-AAAAA-AAAAA-AAAAA-AAAAA-AAAAA"),
            Err(ShareCodeError::InvalidFormat)
        );
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        // 'l' and '0' are deliberately absent from the alphabet
        assert_eq!(
            decode("CSGO-AAAAl-AAAAA-AAAAA-AAAAA-AAAAA"),
            Err(ShareCodeError::InvalidFormat)
        );
        assert_eq!(
            decode("CSGO-AAAA0-AAAAA-AAAAA-AAAAA-AAAAA"),
            Err(ShareCodeError::InvalidFormat)
        );
    }
}
